use crate::config::parse_timeout_secs;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Build and launch descriptors for Python WSGI applications
#[derive(Parser, Debug)]
#[command(
    name = "launchbox",
    about = "Build and launch descriptors for Python WSGI applications",
    version,
    author,
    long_about = "launchbox inspects a Python web application, derives a launch descriptor \
                  (base image, system packages, locked dependencies, entry command), renders \
                  it as a Dockerfile, and runs the entry process locally."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Derive a launch descriptor from an application tree",
        long_about = "Reads the dependency manifest and lock, the Python version pins and the \
                      top-level Python modules, and prints a launch descriptor.\n\n\
                      Examples:\n  \
                      launchbox detect\n  \
                      launchbox detect /path/to/app --format yaml -o launch.yaml\n  \
                      launchbox detect --format dockerfile"
    )]
    Detect(DetectArgs),

    #[command(
        about = "Resolve the manifest against the lock file",
        long_about = "Prints the exact install set (name==version) and its digest.\n\n\
                      Examples:\n  \
                      launchbox lock\n  \
                      launchbox lock /path/to/app --format json"
    )]
    Lock(LockArgs),

    #[command(about = "Render a descriptor as a Dockerfile")]
    Render(RenderArgs),

    #[command(about = "Check a descriptor and its dependency resolution")]
    Validate(ValidateArgs),

    #[command(
        about = "Run the descriptor's entry process",
        long_about = "Starts the entry command in the application source tree, waits for it \
                      to listen on the bind address, optionally probes it over HTTP, and exits \
                      with the process's exit code.\n\n\
                      Examples:\n  \
                      launchbox launch launch.yaml\n  \
                      launchbox launch launch.yaml --probe /health"
    )]
    Launch(LaunchArgs),

    #[command(about = "Send one HTTP liveness probe")]
    Probe(ProbeArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct DetectArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to the application (defaults to current directory)"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct LockArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to the application (defaults to current directory)"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: LockFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct RenderArgs {
    #[arg(value_name = "DESCRIPTOR", help = "Launch descriptor (YAML or JSON)")]
    pub descriptor: PathBuf,

    #[arg(
        long,
        value_name = "PATH",
        help = "Application source tree (defaults to the descriptor's directory)"
    )]
    pub source: Option<PathBuf>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the Dockerfile to a file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(value_name = "DESCRIPTOR", help = "Launch descriptor (YAML or JSON)")]
    pub descriptor: PathBuf,

    #[arg(
        long,
        value_name = "PATH",
        help = "Application source tree (defaults to the descriptor's directory)"
    )]
    pub source: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct LaunchArgs {
    #[arg(value_name = "DESCRIPTOR", help = "Launch descriptor (YAML or JSON)")]
    pub descriptor: PathBuf,

    #[arg(
        long,
        value_name = "PATH",
        help = "Directory to run the entry process in (defaults to the descriptor's directory)"
    )]
    pub source: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "HTTP path to probe once the process is listening, e.g. /health"
    )]
    pub probe: Option<String>,

    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = parse_timeout_arg,
        help = "How long to wait for the listener, 1-600 (overrides LAUNCHBOX_STARTUP_TIMEOUT)"
    )]
    pub startup_timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct ProbeArgs {
    #[arg(value_name = "URL", help = "URL to request, e.g. http://127.0.0.1:5000/")]
    pub url: String,

    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = parse_timeout_arg,
        help = "Request timeout, 1-600 (overrides LAUNCHBOX_PROBE_TIMEOUT)"
    )]
    pub timeout: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}

/// Output formats of `lock`; an install set has no Dockerfile form
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<LockFormatArg> for super::output::OutputFormat {
    fn from(arg: LockFormatArg) -> Self {
        match arg {
            LockFormatArg::Json => super::output::OutputFormat::Json,
            LockFormatArg::Yaml => super::output::OutputFormat::Yaml,
            LockFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_timeout_arg(s: &str) -> Result<u64, String> {
    parse_timeout_secs("timeout", s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_detect_args() {
        let args = CliArgs::parse_from(["launchbox", "detect"]);
        match args.command {
            Commands::Detect(detect_args) => {
                assert_eq!(detect_args.format, OutputFormatArg::Human);
                assert!(detect_args.path.is_none());
                assert!(detect_args.output.is_none());
            }
            _ => panic!("Expected Detect command"),
        }
    }

    #[test]
    fn test_detect_with_options() {
        let args = CliArgs::parse_from([
            "launchbox",
            "detect",
            "/tmp/app",
            "--format",
            "dockerfile",
            "-o",
            "Dockerfile",
        ]);
        match args.command {
            Commands::Detect(detect_args) => {
                assert_eq!(detect_args.path, Some(PathBuf::from("/tmp/app")));
                assert_eq!(detect_args.format, OutputFormatArg::Dockerfile);
                assert_eq!(detect_args.output, Some(PathBuf::from("Dockerfile")));
            }
            _ => panic!("Expected Detect command"),
        }
    }

    #[test]
    fn test_lock_command() {
        let args = CliArgs::parse_from(["launchbox", "lock", "-f", "json"]);
        match args.command {
            Commands::Lock(lock_args) => {
                assert_eq!(lock_args.format, LockFormatArg::Json);
                assert!(lock_args.path.is_none());
            }
            _ => panic!("Expected Lock command"),
        }
    }

    #[test]
    fn test_lock_rejects_dockerfile_format() {
        let err = CliArgs::try_parse_from(["launchbox", "lock", "-f", "dockerfile"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_timeouts_outside_range_rejected() {
        for value in ["0", "601", "soon"] {
            assert!(CliArgs::try_parse_from([
                "launchbox",
                "launch",
                "launch.yaml",
                "--startup-timeout",
                value
            ])
            .is_err());
            assert!(CliArgs::try_parse_from([
                "launchbox",
                "probe",
                "http://127.0.0.1:5000/",
                "--timeout",
                value
            ])
            .is_err());
        }

        let args =
            CliArgs::parse_from(["launchbox", "probe", "http://127.0.0.1:5000/", "--timeout", "600"]);
        match args.command {
            Commands::Probe(probe_args) => assert_eq!(probe_args.timeout, Some(600)),
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_render_requires_descriptor() {
        assert!(CliArgs::try_parse_from(["launchbox", "render"]).is_err());

        let args = CliArgs::parse_from(["launchbox", "render", "launch.yaml", "--source", "app"]);
        match args.command {
            Commands::Render(render_args) => {
                assert_eq!(render_args.descriptor, PathBuf::from("launch.yaml"));
                assert_eq!(render_args.source, Some(PathBuf::from("app")));
            }
            _ => panic!("Expected Render command"),
        }
    }

    #[test]
    fn test_launch_with_options() {
        let args = CliArgs::parse_from([
            "launchbox",
            "launch",
            "launch.yaml",
            "--probe",
            "/health",
            "--startup-timeout",
            "10",
        ]);
        match args.command {
            Commands::Launch(launch_args) => {
                assert_eq!(launch_args.probe, Some("/health".to_string()));
                assert_eq!(launch_args.startup_timeout, Some(10));
                assert!(launch_args.source.is_none());
            }
            _ => panic!("Expected Launch command"),
        }
    }

    #[test]
    fn test_probe_command() {
        let args = CliArgs::parse_from(["launchbox", "probe", "http://127.0.0.1:5000/"]);
        match args.command {
            Commands::Probe(probe_args) => {
                assert_eq!(probe_args.url, "http://127.0.0.1:5000/");
                assert!(probe_args.timeout.is_none());
            }
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["launchbox", "-v", "lock"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["launchbox", "lock", "-q"]);
        assert!(args.quiet);

        let args = CliArgs::parse_from(["launchbox", "--log-level", "debug", "lock"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["launchbox", "-v", "-q", "lock"]).is_err());
    }
}
