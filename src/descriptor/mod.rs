//! Typed build-and-launch descriptor

mod entry;
mod error;
mod image;
mod schema;

pub use entry::{AppRef, BindAddress, EntryCommand};
pub use error::DescriptorError;
pub use image::ImageRef;
pub use schema::{CopySpec, DescriptorFormat, LaunchDescriptor, DEFAULT_WORKDIR, SCHEMA_VERSION};
