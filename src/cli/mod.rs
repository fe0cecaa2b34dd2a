// CLI module for markpilot
// Author: kelexine (https://github.com/kelexine)

use crate::client::validate_api_key;
use crate::config::{AppConfig, ProviderKind};
use crate::error::Result;
use crate::ledger::LocalClock;
use crate::state::StateStore;
use clap::{Parser, Subcommand};
use std::fmt::Write;
use std::sync::Arc;

/// markpilot - debounced, cached and cost-metered completions for text editors
#[derive(Parser, Debug)]
#[command(name = "markpilot", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.markpilot/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the local daemon (default)
    Serve,
    /// Print today's and this month's spending
    Usage,
    /// Validate the configuration and API key format without network access
    Check,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load_from(path),
            None => AppConfig::load(),
        }
    }
}

/// Spending summary read from the persisted state.
pub fn usage_report(config: &AppConfig) -> Result<String> {
    let store = StateStore::open(&config.state.path, Arc::new(LocalClock))?;
    let ledger = store.ledger();

    let mut report = String::new();
    let _ = writeln!(report, "Today:      ${}", ledger.total_for_today());
    let _ = writeln!(report, "This month: ${}", ledger.total_for_this_month());
    if let Some(today) = ledger.usage_for_today() {
        let _ = writeln!(
            report,
            "Tokens today: {} prompt, {} completion",
            today.prompt_tokens, today.completion_tokens
        );
    }
    match config.usage.monthly_limit_usd {
        Some(limit) => {
            let _ = write!(report, "Monthly limit: ${:.2}", limit);
        }
        None => {
            let _ = write!(report, "Monthly limit: none");
        }
    }
    Ok(report)
}

/// Checks every provider an enabled feature depends on. Returns whether all
/// checks passed, and a line per feature.
pub fn check_report(config: &AppConfig) -> (bool, String) {
    let features: [(&str, bool, ProviderKind, &str); 2] = [
        (
            "completions",
            config.completions.enabled,
            config.completions.provider,
            &config.completions.model,
        ),
        ("chat", config.chat.enabled, config.chat.provider, &config.chat.model),
    ];

    let mut all_ok = true;
    let mut report = String::new();
    for (feature, enabled, kind, model) in features {
        if !enabled {
            let _ = writeln!(report, "{:<12} disabled", feature);
            continue;
        }
        let credentials = config.providers.credentials(kind);
        let base_url = credentials
            .base_url
            .as_deref()
            .unwrap_or_else(|| kind.default_base_url());
        match validate_api_key(kind, credentials.api_key.as_deref()) {
            Ok(_) => {
                let _ = writeln!(report, "{:<12} ok    {} {} ({})", feature, kind, model, base_url);
            }
            Err(e) => {
                all_ok = false;
                let _ = writeln!(report, "{:<12} error {}", feature, e);
            }
        }
    }
    (all_ok, report.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderCredentials;

    #[test]
    fn test_serve_is_the_default_command() {
        let args = Args::parse_from(["markpilot"]);
        assert_eq!(args.command(), Command::Serve);

        let args = Args::parse_from(["markpilot", "usage", "--config", "/tmp/markpilot.toml"]);
        assert_eq!(args.command(), Command::Usage);
        assert_eq!(args.config.as_deref(), Some("/tmp/markpilot.toml"));
    }

    #[test]
    fn test_check_reports_missing_key() {
        let config = AppConfig::default();
        let (ok, report) = check_report(&config);
        assert!(!ok);
        assert!(report.contains("OpenAI API key is not set."));
    }

    #[test]
    fn test_check_passes_with_valid_keys() {
        let mut config = AppConfig::default();
        config.providers.openai = ProviderCredentials {
            api_key: Some("sk-test123".to_string()),
            base_url: None,
        };
        let (ok, report) = check_report(&config);
        assert!(ok, "{}", report);
        assert!(report.contains("https://api.openai.com/v1"));
    }

    #[test]
    fn test_usage_report_from_empty_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.state.path = dir.path().join("state.json").to_string_lossy().into_owned();

        let report = usage_report(&config).unwrap();
        assert!(report.contains("Today:      $0"));
        assert!(report.contains("Monthly limit: none"));
    }
}
