mod dockerfile;

pub use dockerfile::render_dockerfile;
