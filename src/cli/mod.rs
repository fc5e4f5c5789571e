pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{
    CliArgs, Commands, DetectArgs, LaunchArgs, LockArgs, ProbeArgs, RenderArgs, ValidateArgs,
};
pub use output::{LockReport, OutputFormat, OutputFormatter};
