//! Dashboard-facing status snapshot of a freshly-constructed guard runtime
//! (SPEC_FULL.md supplemented feature, grounded on `dashflow-cli`'s
//! `status.rs` table/JSON dual-format shape).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use guard_core::config::GuardConfig;
use guard_core::detection::classifier::LocalClassifier;
use guard_core::detection::DetectionAggregator;
use guard_core::guard::RuntimeGuard;
use guard_core::policy::PolicyEngine;
use guard_core::store::PatternStore;

use crate::output::{create_table, print_success};
use crate::patterns::builtin_patterns;

/// Show pattern store, cache, and policy status
#[derive(Args)]
pub struct StatusArgs {
    /// Path to a `GuardConfig` TOML file. Defaults to built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    format: String,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    config.validate()?;

    let pattern_store = Arc::new(PatternStore::new(builtin_patterns()));
    let detector = DetectionAggregator::new(
        pattern_store.clone(),
        None,
        LocalClassifier::disabled(),
        Duration::from_millis(config.security.pattern_timeout_ms),
        false,
    );
    let guard = RuntimeGuard::new(config, pattern_store, detector, None, PolicyEngine::new());
    let status = guard.status();

    if args.format == "json" {
        let json = serde_json::json!({
            "pattern_store_version": status.pattern_store_version,
            "pattern_count": status.pattern_count,
            "cache_entries": status.cache_entries,
            "cache_hits": status.cache_hits,
            "cache_misses": status.cache_misses,
            "tokens_saved_by_cache": status.tokens_saved_by_cache,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!();
    println!("{}", "Guard Status".bright_white().bold());
    println!("{}", "=".repeat(40).bright_black());

    let mut table = create_table();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["pattern_store_version", &status.pattern_store_version.to_string()]);
    table.add_row(vec!["pattern_count", &status.pattern_count.to_string()]);
    table.add_row(vec!["cache_entries", &status.cache_entries.to_string()]);
    table.add_row(vec!["cache_hits", &status.cache_hits.to_string()]);
    table.add_row(vec!["cache_misses", &status.cache_misses.to_string()]);
    table.add_row(vec!["tokens_saved_by_cache", &status.tokens_saved_by_cache.to_string()]);
    println!("{table}");

    print_success("guard runtime healthy");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<GuardConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Ok(GuardConfig::from_toml(&contents)?)
        }
        None => Ok(GuardConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_no_path_given() {
        let config = load_config(None).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_config_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.toml");
        let default_toml = toml::to_string(&GuardConfig::default()).unwrap();
        std::fs::write(&path, default_toml).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn run_reports_builtin_pattern_count() {
        let args = StatusArgs { config: None, format: "json".to_string() };
        assert!(run(args).await.is_ok());
    }
}
