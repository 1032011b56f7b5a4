//! Configuration loading and validation

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::Snowflake;
use crate::transcript::NameOverrides;

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_OUTPUT_DIR: &str = "transcripts";
const DEFAULT_ASSET_PREFIX: &str = "../../assets/judiciary";
const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page the messages endpoint accepts
const MAX_PAGE_SIZE: u32 = 100;

const TEMPLATE: &str = r#"# Bot token used to read the channel history
discord_token = ""

# Channel holding the proceedings
# channel_id = "000000000000000000"

# History is read backwards starting just before this message
# start_msg_id = "000000000000000000"

# Last message included in the transcript
# end_msg_id = "000000000000000000"

# Title of the transcript, also used for the output folder name
trial_name = ""

# JSON object mapping user ids to display names
name_override = "{}"

# output_dir = "transcripts"
# asset_prefix = "../../assets/judiciary"
# page_size = 50
"#;

/// Missing required settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}` (set it in the config file or the {1} environment variable)")]
    Missing(&'static str, &'static str),
    #[error("name override must be a JSON object of strings: {0}")]
    NameOverride(#[source] serde_json::Error),
}

/// Application configuration
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bot token
    pub discord_token: Option<String>,
    /// Channel to export
    pub channel_id: Option<Snowflake>,
    /// Paging anchor; history is read from just before this message
    pub start_msg_id: Option<Snowflake>,
    /// Inclusive end of the transcript
    pub end_msg_id: Option<Snowflake>,
    /// Human title of the trial
    pub trial_name: Option<String>,
    /// Author id → display name, as a JSON object string
    pub name_override: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Prefix of attachment links inside the document
    pub asset_prefix: Option<String>,
    pub page_size: Option<u32>,
    pub api_base: Option<String>,
}

/// Fully validated settings for one export run
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    pub channel_id: Snowflake,
    pub start_msg_id: Snowflake,
    pub end_msg_id: Snowflake,
    pub trial_name: String,
    pub name_override: NameOverrides,
    pub output_dir: PathBuf,
    pub asset_prefix: String,
    pub page_size: u32,
    pub api_base: String,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "trial-transcript", "trial-transcript")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file {} does not exist", p.display());
                }
                p.to_path_buf()
            }
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Override fields from environment-style lookups.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let id = |key: &str| -> Result<Option<Snowflake>> {
            lookup(key)
                .map(|v| {
                    v.parse()
                        .with_context(|| format!("{} is not a valid id: {:?}", key, v))
                })
                .transpose()
        };

        if let Some(v) = lookup("DISCORD_TOKEN") {
            self.discord_token = Some(v);
        }
        if let Some(v) = id("CHANNEL_ID")? {
            self.channel_id = Some(v);
        }
        if let Some(v) = id("START_MSG_ID")? {
            self.start_msg_id = Some(v);
        }
        if let Some(v) = id("END_MSG_ID")? {
            self.end_msg_id = Some(v);
        }
        if let Some(v) = lookup("TRIAL_NAME") {
            self.trial_name = Some(v);
        }
        if let Some(v) = lookup("NAME_OVERRIDE") {
            self.name_override = Some(v);
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Parse the name override JSON. An absent value is an empty mapping.
    pub fn name_overrides(&self) -> Result<NameOverrides, ConfigError> {
        match self.name_override.as_deref() {
            None => Ok(NameOverrides::default()),
            Some(s) if s.trim().is_empty() => Ok(NameOverrides::default()),
            Some(s) => NameOverrides::from_json(s).map_err(ConfigError::NameOverride),
        }
    }

    /// Check required settings and fill in defaults.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        fn require<T: Clone>(
            v: &Option<T>,
            name: &'static str,
            env: &'static str,
        ) -> Result<T, ConfigError> {
            v.clone().ok_or(ConfigError::Missing(name, env))
        }

        let discord_token = require(&self.discord_token, "discord_token", "DISCORD_TOKEN")?;
        if discord_token.trim().is_empty() {
            return Err(ConfigError::Missing("discord_token", "DISCORD_TOKEN"));
        }
        let trial_name = require(&self.trial_name, "trial_name", "TRIAL_NAME")?;
        if trial_name.trim().is_empty() {
            return Err(ConfigError::Missing("trial_name", "TRIAL_NAME"));
        }

        Ok(Settings {
            discord_token,
            channel_id: require(&self.channel_id, "channel_id", "CHANNEL_ID")?,
            start_msg_id: require(&self.start_msg_id, "start_msg_id", "START_MSG_ID")?,
            end_msg_id: require(&self.end_msg_id, "end_msg_id", "END_MSG_ID")?,
            trial_name,
            name_override: self.name_overrides()?,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            asset_prefix: self
                .asset_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSET_PREFIX.to_string()),
            page_size: self
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            api_base: self
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    /// Write a template config file. Refuses to overwrite an existing file
    /// unless `force` is set.
    pub fn write_template(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        fs::write(path, TEMPLATE).context("Failed to write config file")?;

        // Restrictive permissions: the file holds a bot token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_toml() -> &'static str {
        r#"
discord_token = "abc"
channel_id = "100"
start_msg_id = 200
end_msg_id = "150"
trial_name = "Trial: Case, One."
name_override = '{"7": "Alice"}'
"#
    }

    #[test]
    fn test_parse_and_validate_defaults() {
        let config = Config::parse(full_toml()).unwrap();
        let settings = config.validate().unwrap();
        assert_eq!(settings.channel_id, Snowflake(100));
        assert_eq!(settings.start_msg_id, Snowflake(200));
        assert_eq!(settings.end_msg_id, Snowflake(150));
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.output_dir, PathBuf::from("transcripts"));
        assert_eq!(settings.asset_prefix, "../../assets/judiciary");
        assert_eq!(settings.name_override.get(Snowflake(7)), Some("Alice"));
    }

    #[test]
    fn test_missing_token_is_error() {
        let config = Config::parse("trial_name = \"x\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("discord_token", _)));
    }

    #[test]
    fn test_malformed_override_is_error() {
        let mut config = Config::parse(full_toml()).unwrap();
        config.name_override = Some("{not json".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NameOverride(_))
        ));

        config.name_override = Some(r#"{"7": 5}"#.to_string());
        assert!(config.name_overrides().is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::parse(full_toml()).unwrap();
        let env: HashMap<&str, &str> = [("TRIAL_NAME", "Other"), ("END_MSG_ID", "175")]
            .into_iter()
            .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.trial_name.as_deref(), Some("Other"));
        assert_eq!(config.end_msg_id, Some(Snowflake(175)));
        assert_eq!(config.channel_id, Some(Snowflake(100)));
    }

    #[test]
    fn test_env_bad_id_is_error() {
        let mut config = Config::default();
        let result = config.apply_env(|k| (k == "CHANNEL_ID").then(|| "nope".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_page_size_is_clamped() {
        let mut config = Config::parse(full_toml()).unwrap();
        config.page_size = Some(500);
        assert_eq!(config.validate().unwrap().page_size, 100);
        config.page_size = Some(0);
        assert_eq!(config.validate().unwrap().page_size, 1);
    }

    #[test]
    fn test_template_parses() {
        let config = Config::parse(TEMPLATE).unwrap();
        assert_eq!(config.discord_token.as_deref(), Some(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_template_refuses_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        Config::write_template(&path, false).unwrap();
        assert!(Config::write_template(&path, false).is_err());
        Config::write_template(&path, true).unwrap();
    }
}
