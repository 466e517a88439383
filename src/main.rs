use clap::Parser;
use honeyshell::configuration::config::Args;
use honeyshell::configuration::Config;
use honeyshell::controller::Controller;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("sea_orm", log::LevelFilter::Warn)
        .filter_module("sqlx", log::LevelFilter::Warn)
        .filter_module("russh", log::LevelFilter::Info)
        .format_target(false)
        .init();

    info!("honeyshell starting up");

    let args = Args::parse();
    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    info!("listening on {}, container image {}", config.bind_address, config.honeypot_image);

    let controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("failed to initialize controller: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("controller exited with error: {e}");
        std::process::exit(1);
    }

    info!("honeyshell shut down cleanly");
}
