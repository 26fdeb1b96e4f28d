//! logbridge-check - check that configured plugin classes load
//!
//! Builds every configured plugin (or the ones named with `--plugin`),
//! runs `init`/`deinit` on it, frees it, and reports the outcome.
//!
//! # Usage
//!
//! ```bash
//! logbridge-check --config ./logbridge.toml
//! logbridge-check --config ./logbridge.toml --plugin es --plugin drop-debug --json
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use logbridge_runtime::{Config, PluginConfig, PluginInstance, Runtime};
use serde::Serialize;
use std::path::PathBuf;

/// Load configured plugin classes and report which ones work
#[derive(Parser)]
#[command(name = "logbridge-check")]
#[command(author, version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Check only this plugin (can be specified multiple times)
    #[arg(short, long)]
    plugin: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    name: String,
    role: String,
    class_name: Option<String>,
    ok: bool,
    error: Option<String>,
}

fn check(plugin: &PluginConfig) -> CheckReport {
    let mut report = CheckReport {
        name: plugin.name.clone(),
        role: plugin.role.to_string(),
        class_name: plugin.class_name.clone(),
        ok: false,
        error: None,
    };

    match PluginInstance::from_config(plugin) {
        Ok(mut instance) => {
            report.ok = instance.init();
            if !report.ok {
                report.error = Some("init failed".to_string());
            }
            instance.deinit();
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.apply_env();

    logbridge_runtime::init_with(&config.logging)?;
    Runtime::global().configure(config.runtime.clone())?;

    for name in &args.plugin {
        if config.plugin(name).is_none() {
            bail!("no plugin named '{}' in {}", name, args.config.display());
        }
    }

    let selected: Vec<&PluginConfig> = config
        .plugins
        .iter()
        .filter(|p| args.plugin.is_empty() || args.plugin.contains(&p.name))
        .collect();

    let reports: Vec<CheckReport> = selected.into_iter().map(check).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            match &report.error {
                None => println!("ok      {} ({})", report.name, report.role),
                Some(error) => println!("FAILED  {} ({}): {}", report.name, report.role, error),
            }
        }
    }

    if reports.iter().any(|r| !r.ok) {
        std::process::exit(1);
    }
    Ok(())
}
