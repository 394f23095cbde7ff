use anyhow::{Context, Result};
use hdlrun_config::{ConfigLoader, ConfigSnapshot};

use crate::args::Cli;

/// Install the stderr subscriber. `RUST_LOG` wins; otherwise only warnings
/// are shown so tool output stays readable.
pub(crate) fn initialize_tracing() -> Result<()> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to initialize tracing")
}

/// File configuration (explicit path, `HDLRUN_CONFIG_PATH` or discovery)
/// with the command-line overrides applied.
pub(crate) fn load_config(cli: &Cli) -> Result<ConfigSnapshot> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(path) = loader.config_path() {
        tracing::debug!(path = %path.display(), "using configuration file");
    }

    let mut config = loader.into_config();
    cli.apply_overrides(&mut config);
    config.normalize();
    config
        .validate()
        .context("Invalid configuration after command-line overrides")?;
    Ok(config)
}
