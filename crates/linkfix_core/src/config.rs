use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "linkfix/0.1";
pub const DEFAULT_EDIT_SUMMARY: &str = "Replace archived link for live version";
pub const DEFAULT_AUTHOR: &str = "Archived links script";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LEDGER_PATH: &str = ".linkfix/linkfix.db";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LinkfixConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub fixer: FixerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    pub bot_username: Option<String>,
    pub bot_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FixerSection {
    pub edit_summary: Option<String>,
    pub author: Option<String>,
    pub year: Option<String>,
    pub probe_timeout_ms: Option<u64>,
    pub ledger_path: Option<String>,
}

impl LinkfixConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url(&self) -> Option<String> {
        env_override("WIKI_API_URL").or_else(|| self.wiki.api_url.clone())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve the bot account used to attribute saved revisions.
    pub fn bot_username(&self) -> Option<String> {
        env_override("WIKI_BOT_USERNAME").or_else(|| self.wiki.bot_username.clone())
    }

    pub fn bot_password(&self) -> Option<String> {
        env_override("WIKI_BOT_PASSWORD").or_else(|| self.wiki.bot_password.clone())
    }

    pub fn edit_summary(&self) -> String {
        self.fixer
            .edit_summary
            .clone()
            .unwrap_or_else(|| DEFAULT_EDIT_SUMMARY.to_string())
    }

    pub fn author(&self) -> String {
        self.fixer
            .author
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
    }

    /// Default snapshot-year restriction; empty means unrestricted.
    pub fn year(&self) -> String {
        self.fixer.year.clone().unwrap_or_default()
    }

    pub fn probe_timeout_ms(&self) -> u64 {
        if let Some(value) = env_override("LINKFIX_PROBE_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            return parsed;
        }
        self.fixer
            .probe_timeout_ms
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS)
    }

    pub fn ledger_path(&self) -> PathBuf {
        if let Some(value) = env_override("LINKFIX_LEDGER_PATH") {
            return PathBuf::from(value);
        }
        PathBuf::from(
            self.fixer
                .ledger_path
                .clone()
                .unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string()),
        )
    }
}

/// Load a config from a TOML file. Returns defaults if the file is missing.
pub fn load_config(config_path: &Path) -> Result<LinkfixConfig> {
    if !config_path.exists() {
        return Ok(LinkfixConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: LinkfixConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
