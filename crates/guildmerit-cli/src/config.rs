use config::{Config, ConfigError, Environment, File};
use guildmerit_core::{
    AssignmentConfig, EngineConfig, IdentityMapping, RepoFilter, RoleRuleSet, RunMode,
    ScoringConfig, WritePermissions,
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "guildmerit.toml";

fn secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Complete application configuration
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub roles: RoleRuleSet,
    #[serde(default)]
    pub assignments: AssignmentConfig,
    #[serde(default)]
    pub identity_mappings: Vec<IdentityMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "DEBUG", alias = "debug")]
    Debug,
    #[serde(rename = "INFO", alias = "info")]
    Info,
    #[serde(rename = "WARN", alias = "warn")]
    Warn,
    #[serde(rename = "ERROR", alias = "error")]
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub mode: RunMode,
    pub log_level: LogLevel,
    /// Reports land in `<data_dir>/reports`, snapshots in `<data_dir>/snapshots`
    pub data_dir: PathBuf,
    /// Write a JSON state snapshot after every cycle
    pub snapshots: bool,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// GitHub configuration
#[derive(Debug, Deserialize)]
pub struct GithubConfig {
    pub org: String,
    #[serde(deserialize_with = "secret")]
    pub token: SecretString,
    pub api_url: Option<String>,
    pub write: bool,
    /// Repository allow/deny list applied during ingestion and merge counting
    pub repos: Option<RepoFilter>,
}

/// Discord configuration
#[derive(Debug, Deserialize)]
pub struct DiscordConfig {
    pub guild_id: String,
    #[serde(deserialize_with = "secret")]
    pub token: SecretString,
    pub api_url: Option<String>,
    pub write: bool,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Sources in order, later ones overriding earlier ones:
    /// 1. Default values
    /// 2. The TOML file at `path` (required), or `guildmerit.toml` if present
    /// 3. Environment variables prefixed with `GUILDMERIT_`, `__` for nesting:
    ///    - GUILDMERIT_RUNTIME__MODE=observer
    ///    - GUILDMERIT_GITHUB__TOKEN=ghp_...
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("runtime.mode", "dry-run")?
            .set_default("runtime.log_level", "INFO")?
            .set_default("runtime.data_dir", "data")?
            .set_default("runtime.snapshots", false)?
            .set_default("database.url", "sqlite://guildmerit.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("github.org", "")?
            .set_default("github.token", "")?
            .set_default("github.write", false)?
            .set_default("discord.guild_id", "")?
            .set_default("discord.token", "")?
            .set_default("discord.write", false)?;

        let builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder.add_source(File::with_name(DEFAULT_CONFIG_FILE))
            }
            None => builder,
        };

        let builder = builder.add_source(
            Environment::with_prefix("GUILDMERIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Engine settings for one cycle; `mode` overrides `runtime.mode`
    pub fn engine_config(&self, mode: Option<RunMode>) -> EngineConfig {
        EngineConfig {
            mode: mode.unwrap_or(self.runtime.mode),
            permissions: WritePermissions {
                chat: self.discord.write,
                code_host: self.github.write,
            },
            scoring: self.scoring.clone(),
            roles: self.roles.clone(),
            assignments: self.assignments.clone(),
            identity_mappings: self.identity_mappings.clone(),
            repo_filter: self.github.repos.clone(),
            snapshots: self.runtime.snapshots,
        }
    }
}
