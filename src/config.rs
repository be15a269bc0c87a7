// src/config.rs
//! Application configuration.
//!
//! One TOML file, located via:
//! 1) explicit path (CLI `--config`)
//! 2) $TOP_OF_THE_PILE_CONFIG
//! 3) config/top_of_the_pile.toml
//!
//! Secrets come from the environment (after `.env` is loaded) and override
//! the file: SMTP_USER, SMTP_PASS, SEARCH_API_KEY.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::classify::ClassifierProfile;
use crate::enrich::EnrichSettings;
use crate::locations::LocationsConfig;
use crate::notify::email::SmtpTls;
use crate::retry::RetryPolicy;
use crate::sync::{SeedPolicy, SyncSettings};

pub const ENV_CONFIG_PATH: &str = "TOP_OF_THE_PILE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/top_of_the_pile.toml";

const ENV_SMTP_USER: &str = "SMTP_USER";
const ENV_SMTP_PASS: &str = "SMTP_PASS";
const ENV_SEARCH_API_KEY: &str = "SEARCH_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub sync: SyncConfig,
    pub enrich: EnrichConfig,
    pub mail: Option<MailConfig>,
    pub store: StoreConfig,
    pub locations: LocationsConfig,
    pub profiles: Vec<ClassifierProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub page_size: usize,
    pub terms: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.indeed.com/ads/apisearch".into(),
            api_key: None,
            page_size: 25,
            terms: vec!["machine learning".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    pub max_pages: usize,
    pub seed_policy: SeedPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            backoff_ms: 500,
            timeout_secs: 15,
            max_pages: 40,
            seed_policy: SeedPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff: Duration::from_millis(self.backoff_ms),
                timeout: Duration::from_secs(self.timeout_secs),
            },
            seed_policy: self.seed_policy,
            max_pages: self.max_pages,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 2,
            backoff_ms: 500,
            timeout_secs: 20,
        }
    }
}

impl EnrichConfig {
    pub fn settings(&self) -> EnrichSettings {
        EnrichSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff: Duration::from_millis(self.backoff_ms),
                timeout: Duration::from_secs(self.timeout_secs),
            },
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: SmtpTls,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

fn default_mail_timeout() -> u64 {
    30
}

impl MailConfig {
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/postings.json"),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config TOML")?;
        if cfg.profiles.is_empty() {
            cfg.profiles.push(ClassifierProfile::machine_learning());
        }
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Resolve the path (explicit → env → default) and load it.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Environment wins over the file for secrets.
    pub fn apply_env(&mut self) {
        if let Some(key) = env_non_empty(ENV_SEARCH_API_KEY) {
            self.search.api_key = Some(key);
        }
        if let Some(mail) = self.mail.as_mut() {
            if let Some(user) = env_non_empty(ENV_SMTP_USER) {
                mail.username = Some(user);
            }
            if let Some(pass) = env_non_empty(ENV_SMTP_PASS) {
                mail.password = Some(pass);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.terms.iter().all(|t| t.trim().is_empty()) {
            bail!("search.terms must name at least one term");
        }
        if self.search.page_size == 0 {
            bail!("search.page_size must be at least 1");
        }
        if self.sync.concurrency == 0 || self.enrich.concurrency == 0 {
            bail!("concurrency bounds must be at least 1");
        }
        if self.sync.max_attempts == 0 || self.enrich.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.sync.max_pages == 0 {
            bail!("sync.max_pages must be at least 1");
        }
        if let Some(mail) = &self.mail {
            if mail.to.is_empty() {
                bail!("mail.to must list at least one recipient");
            }
        }
        for p in &self.profiles {
            let known = self
                .search
                .terms
                .iter()
                .any(|t| t.trim().eq_ignore_ascii_case(p.term.trim()));
            if !known {
                bail!("profile for '{}' does not match any search term", p.term);
            }
        }
        Ok(())
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gets_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.search.page_size, 25);
        assert_eq!(cfg.search.terms, vec!["machine learning".to_string()]);
        assert_eq!(cfg.sync.seed_policy, SeedPolicy::Suppress);
        assert_eq!(cfg.profiles, vec![ClassifierProfile::machine_learning()]);
        assert!(cfg.mail.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn profile_for_unknown_term_is_rejected() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [search]
            terms = ["data analytics"]

            [[profiles]]
            term = "machine learning"
            keywords = ["data"]
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mail_without_recipients_is_rejected() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [mail]
            host = "smtp.example.com"
            from = "bot@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mail.as_ref().unwrap().tls, SmtpTls::Wrapper);
        assert!(cfg.validate().is_err());
    }
}
