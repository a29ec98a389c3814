use anyhow::Context;
use apaai_client::{AccountabilityLayer, ClientConfig};
use std::future::Future;
use std::path::PathBuf;

/// Connection flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub config: Option<PathBuf>,
}

impl Globals {
    /// Config file used by `config init` and reported by `config show`.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(ClientConfig::default_path)
    }
}

/// Resolve the client configuration.
///
/// Priority: `--endpoint`/`--api-key` > `APAAI_ENDPOINT`/`APAAI_KEY` >
/// `--config` file (or `~/.apaai/config.yaml`) > built-in defaults.
pub fn resolve_config(globals: &Globals) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::resolve(globals.config.as_deref())
        .context("failed to load client config")?;
    apply_flags(&mut config, globals);
    Ok(config)
}

fn apply_flags(config: &mut ClientConfig, globals: &Globals) {
    if let Some(endpoint) = &globals.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(key) = &globals.api_key {
        config.api_key = Some(key.clone());
    }
}

pub fn connect(globals: &Globals) -> anyhow::Result<AccountabilityLayer> {
    let config = resolve_config(globals)?;
    let client = AccountabilityLayer::new(&config)
        .with_context(|| format!("invalid client config for '{}'", config.endpoint))?;
    tracing::debug!(endpoint = client.endpoint(), "connected");
    Ok(client)
}

/// Drive `fut` to completion on a fresh runtime.
pub fn block_on<F, T, E>(fut: F) -> anyhow::Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(fut).map_err(Into::into)
}
