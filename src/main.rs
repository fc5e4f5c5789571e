use launchbox::cli::commands::{CliArgs, Commands};
use launchbox::cli::handlers::{
    handle_detect, handle_launch, handle_lock, handle_probe, handle_render, handle_validate,
};
use launchbox::util::logging::{init_logging, parse_level, LoggingConfig};
use launchbox::{LaunchboxConfig, VERSION};

use clap::Parser;
use tracing::{debug, error, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("launchbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let config = LaunchboxConfig::default();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    debug!("{}", config);

    let exit_code = match &args.command {
        Commands::Detect(detect_args) => handle_detect(detect_args, &config),
        Commands::Lock(lock_args) => handle_lock(lock_args, &config),
        Commands::Render(render_args) => handle_render(render_args, &config),
        Commands::Validate(validate_args) => handle_validate(validate_args, &config, args.quiet),
        Commands::Launch(launch_args) => handle_launch(launch_args, &config).await,
        Commands::Probe(probe_args) => handle_probe(probe_args, &config).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    config.include_target = config.level >= Level::DEBUG;
    init_logging(config);
}
