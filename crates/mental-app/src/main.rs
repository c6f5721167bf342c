//! The `mental` binary.

use clap::Parser;
use mental_app::AppError;
use mental_app::platform::PlatformDirs;
use mental_config::{CliArgs, Config};

fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(&args) {
        eprintln!("mental: {e}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), AppError> {
    let dirs = match &args.config {
        Some(root) => PlatformDirs::resolve_with_root(root),
        None => PlatformDirs::resolve()?,
    };
    dirs.create_all()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(args);
    config.validate()?;
    mental_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!("Config directory: {}", dirs.config_dir.display());

    mental_app::window::run(config, dirs.config_dir)
}
