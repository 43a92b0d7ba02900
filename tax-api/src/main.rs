use clap::Parser;
use tracing::{debug, warn};

use tax_api::config::{AppConfig, Cli};
use tax_api::{logging, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_default_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli)?;

    if logging::env_filter_present() {
        debug!("RUST_LOG is set; ignoring configured level '{}'", config.logging.level);
    } else if let Err(e) = logging::set_log_level(&config.logging.level) {
        warn!("{e:#}; keeping the default level");
    }
    if let Some(path) = &config.logging.file {
        logging::enable_file_logging(path)?;
    }

    debug!(?config, "configuration loaded");
    startup::run(config).await
}
