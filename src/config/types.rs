use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Namespace reserved for global settings in the config store
pub const GENERAL_NAMESPACE: &str = "general";

/// Backup strategy type tag, stored as `type` in every alias namespace
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Github,
    Gist,
    GooglePhotos,
    GoogleDrive,
    Wordpress,
    Dropbox,
    Mysql,
    Server,
    Mongodb,
    Postgresql,
}

impl StrategyKind {
    /// Every strategy, in the order offered by the add menu
    pub const ALL: [StrategyKind; 10] = [
        StrategyKind::Github,
        StrategyKind::Gist,
        StrategyKind::GooglePhotos,
        StrategyKind::GoogleDrive,
        StrategyKind::Wordpress,
        StrategyKind::Dropbox,
        StrategyKind::Mysql,
        StrategyKind::Server,
        StrategyKind::Mongodb,
        StrategyKind::Postgresql,
    ];

    /// Tag used in the config store
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyKind::Github => "github",
            StrategyKind::Gist => "gist",
            StrategyKind::GooglePhotos => "googlephotos",
            StrategyKind::GoogleDrive => "googledrive",
            StrategyKind::Wordpress => "wordpress",
            StrategyKind::Dropbox => "dropbox",
            StrategyKind::Mysql => "mysql",
            StrategyKind::Server => "server",
            StrategyKind::Mongodb => "mongodb",
            StrategyKind::Postgresql => "postgresql",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyKind::Github => "GitHub",
            StrategyKind::Gist => "Gist",
            StrategyKind::GooglePhotos => "Google Photos",
            StrategyKind::GoogleDrive => "Google Drive",
            StrategyKind::Wordpress => "WordPress",
            StrategyKind::Dropbox => "Dropbox",
            StrategyKind::Mysql => "MySQL",
            StrategyKind::Server => "Server",
            StrategyKind::Mongodb => "MongoDB",
            StrategyKind::Postgresql => "PostgreSQL",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown backup type '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Fields shared by every alias namespace
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AliasConfig {
    #[serde(rename = "type")]
    pub kind: StrategyKind,

    /// Base directory for this alias' artifacts
    pub backup_path: PathBuf,

    /// Number of generations to keep
    #[serde(default, deserialize_with = "optional_count")]
    pub versions: Option<u32>,

    /// Exclusion patterns (regular expressions for tree walkers, rsync rules for servers)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Zip archives instead of live sync
    #[serde(default)]
    pub archive: bool,

    /// Mail a report even when the run was clean
    #[serde(default)]
    pub notify_always: bool,

    /// Timeout for external tools
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl AliasConfig {
    /// Whether each run writes into its own timestamped generation
    pub fn is_versioned(&self) -> bool {
        self.versions.map_or(false, |v| v > 1)
    }
}

/// Global settings stored under the `general` namespace
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub mail_user: String,

    #[serde(default)]
    pub mail_pass: String,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Only mail when warnings or errors were recorded
    #[serde(default = "default_failure_only")]
    pub failure_only: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            mail_user: String::new(),
            mail_pass: String::new(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            failure_only: default_failure_only(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
        }
    }
}

impl GeneralConfig {
    pub fn mail_configured(&self) -> bool {
        !self.mail_user.is_empty() && !self.mail_pass.is_empty()
    }
}

/// Sync state of one remote item, stored in the alias' cache keyed by item id
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CacheEntry {
    /// Local path relative to the backup root, `/`-separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Checksum or version tag of the copy at `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Remote modification time of the copy at `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,

    /// Run marker of the last walk that observed the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

// Accepts `3`, `"3"`, `""` and `null`; the add flow may store blank answers.
fn optional_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid count: {}", n))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid count: {}", s))),
        Some(other) => Err(D::Error::custom(format!("invalid count: {}", other))),
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_failure_only() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_files() -> u32 {
    30
}
