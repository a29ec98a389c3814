use crate::output::{mask_secret, print_fields, print_json};
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::{ClientConfig, WarnLevel};
use clap::Subcommand;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the resolved client configuration (api key masked)
    Show,

    /// Write a config file from the current flags and environment
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(globals: &Globals, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(globals, json),
        ConfigSubcommand::Init { force } => init(globals, force, json),
        ConfigSubcommand::Validate => validate(globals, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(globals: &Globals, json: bool) -> anyhow::Result<()> {
    let mut config = settings::resolve_config(globals)?;
    config.api_key = config.api_key.as_deref().map(mask_secret);

    if json {
        print_json(&config)?;
        return Ok(());
    }
    let headers = (!config.headers.is_empty())
        .then(|| config.headers.keys().cloned().collect::<Vec<_>>().join(", "));
    print_fields(&[
        ("endpoint", Some(config.base_url().to_string())),
        ("api_key", config.api_key.clone()),
        ("auth", Some(format!("{:?}", config.auth))),
        ("routes", Some(format!("{:?}", config.approval_routes))),
        ("headers", headers),
        ("timeout", config.timeout_secs.map(|s| format!("{s}s"))),
        (
            "file",
            globals
                .config_path()
                .filter(|p| p.exists())
                .map(|p| p.display().to_string()),
        ),
    ]);
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(globals: &Globals, force: bool, json: bool) -> anyhow::Result<()> {
    let path = globals
        .config_path()
        .context("no home directory; pass --config PATH")?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; use --force to overwrite",
            path.display()
        );
    }

    // Flags and environment only; an existing file is being replaced.
    let mut config = ClientConfig::default();
    config.apply_env(|k| std::env::var(k).ok());
    if let Some(endpoint) = &globals.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(key) = &globals.api_key {
        config.api_key = Some(key.clone());
    }
    config
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "endpoint": config.endpoint,
        }))?;
    } else {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(globals: &Globals, json: bool) -> anyhow::Result<()> {
    let config = settings::resolve_config(globals)?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
