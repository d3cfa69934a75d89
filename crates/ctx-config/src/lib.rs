#![deny(unsafe_code)]

//! Configuration loading, merging, and validation for ctx.
//!
//! Configuration comes from up to two TOML files: a global one under the
//! user's config directory and a local one (`./ctx.toml` or `--config`).
//! Every option is an `Option` so that a local file only overrides the keys
//! it actually sets. [`AppConfig::stream_settings`] then folds command-line
//! overrides on top and yields the validated [`StreamSettings`] for one
//! command.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name of both the local and the global configuration file.
pub const CONFIG_FILE_NAME: &str = "ctx.toml";

/// Directory under the platform config dir that holds the global file.
pub const GLOBAL_CONFIG_DIR: &str = "ctx";

/// Accepted output format names.
pub const SUPPORTED_FORMATS: [&str; 4] = ["toon", "raw", "json", "xml"];

/// Accepted log levels.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("configuration path {} is a directory", .0.display())]
    IsDirectory(PathBuf),

    #[error("configuration already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("cannot determine the user configuration directory")]
    NoConfigDir,

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Defaults for `ctx tree`.
    #[serde(default)]
    pub tree: CommandConfig,

    /// Defaults for `ctx content`.
    #[serde(default)]
    pub content: CommandConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Event session and traversal tuning.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Event channel bound, in events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,

    /// Content chunk payload size in bytes; must be a multiple of 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Prefix window for binary and mime detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sniff_bytes: Option<usize>,
}

/// Options shared by the `tree` and `content` commands.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<bool>,

    /// Include file content in the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<bool>,

    #[serde(default)]
    pub tokens: TokensConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokensConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Names or globs excluded at the top level of every scan root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_gitignore: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ignore: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_git: Option<bool>,
}

pub fn default_log_level() -> String {
    "warn".to_string()
}

pub fn default_channel_capacity() -> usize {
    64
}

pub fn default_chunk_size() -> usize {
    48 * 1024
}

pub fn default_sniff_bytes() -> usize {
    8000
}

pub fn default_format() -> String {
    "toon".to_string()
}

pub fn default_model() -> String {
    "gpt-4o".to_string()
}

// ── Merging ─────────────────────────────────────────────────────────────

fn overlay<T>(base: Option<T>, over: Option<T>) -> Option<T> {
    over.or(base)
}

/// Order-preserving de-duplication.
fn dedup_patterns(patterns: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    patterns
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

impl CommandConfig {
    fn merge(self, over: CommandConfig) -> CommandConfig {
        CommandConfig {
            format: overlay(self.format, over.format),
            summary: overlay(self.summary, over.summary),
            content: overlay(self.content, over.content),
            tokens: TokensConfig {
                enabled: overlay(self.tokens.enabled, over.tokens.enabled),
                model: overlay(self.tokens.model, over.tokens.model),
            },
            paths: PathsConfig {
                exclude: overlay(self.paths.exclude, over.paths.exclude.filter(|e| !e.is_empty()))
                    .map(dedup_patterns),
                use_gitignore: overlay(self.paths.use_gitignore, over.paths.use_gitignore),
                use_ignore: overlay(self.paths.use_ignore, over.paths.use_ignore),
                include_git: overlay(self.paths.include_git, over.paths.include_git),
            },
        }
    }
}

/// Which stream command settings are resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Tree,
    Content,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Tree => "tree",
            CommandKind::Content => "content",
        }
    }

    /// `content` includes file bodies unless told otherwise.
    fn default_content(self) -> bool {
        self == CommandKind::Content
    }
}

/// Command-line values that take precedence over the configuration.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StreamOverrides {
    pub format: Option<String>,
    pub summary: Option<bool>,
    pub content: Option<bool>,
    pub tokens: Option<bool>,
    pub model: Option<String>,
    /// Replaces the configured exclusions when non-empty.
    pub exclude: Vec<String>,
    pub no_gitignore: bool,
    pub no_ignore: bool,
    pub include_git: bool,
}

/// Fully resolved options for one `tree` or `content` run.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub format: String,
    pub summary: bool,
    pub content: bool,
    pub tokens: bool,
    pub model: String,
    pub exclude: Vec<String>,
    pub use_gitignore: bool,
    pub use_ignore: bool,
    pub include_git: bool,
    pub channel_capacity: usize,
    pub chunk_size: usize,
    pub sniff_bytes: usize,
}

impl StreamSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_format(&self.format)?;
        if self.tokens && self.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "a token model is required when token counting is enabled".to_string(),
            ));
        }
        validate_engine(self.channel_capacity, self.chunk_size, self.sniff_bytes)
    }
}

fn validate_format(format: &str) -> Result<(), ConfigError> {
    let normalized = format.trim().to_ascii_lowercase();
    if !SUPPORTED_FORMATS.contains(&normalized.as_str()) {
        return Err(ConfigError::Validation(format!(
            "Invalid format value '{format}'; expected one of {SUPPORTED_FORMATS:?}"
        )));
    }
    Ok(())
}

fn validate_engine(capacity: usize, chunk_size: usize, sniff_bytes: usize) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::Validation(
            "engine.channel_capacity must be at least 1".to_string(),
        ));
    }
    if chunk_size == 0 || !chunk_size.is_multiple_of(3) {
        return Err(ConfigError::Validation(format!(
            "engine.chunk_size must be a non-zero multiple of 3, got {chunk_size}"
        )));
    }
    if sniff_bytes == 0 {
        return Err(ConfigError::Validation(
            "engine.sniff_bytes must be non-zero".to_string(),
        ));
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the global file, then the local one on top.
    ///
    /// `explicit` replaces `<working_dir>/ctx.toml` and must exist; the
    /// implicit files are optional.
    pub async fn load_layered(
        working_dir: &Path,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = AppConfig::default();
        if let Some(global) = global_config_path()
            && let Some(config) = load_optional(&global).await?
        {
            debug!(path = %global.display(), "loaded global configuration");
            merged = merged.merge(config);
        }

        let local = match explicit {
            Some(path) => {
                let path = working_dir.join(path);
                Some(Self::load(&path).await.map(|c| (path, c))?)
            }
            None => {
                let path = working_dir.join(CONFIG_FILE_NAME);
                load_optional(&path).await?.map(|c| (path, c))
            }
        };
        if let Some((path, config)) = local {
            debug!(path = %path.display(), "loaded local configuration");
            merged = merged.merge(config);
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Overlay `over` on `self`; keys set in `over` win.
    pub fn merge(self, over: AppConfig) -> AppConfig {
        AppConfig {
            logging: LoggingConfig {
                level: overlay(self.logging.level, over.logging.level),
            },
            engine: EngineConfig {
                channel_capacity: overlay(self.engine.channel_capacity, over.engine.channel_capacity),
                chunk_size: overlay(self.engine.chunk_size, over.engine.chunk_size),
                sniff_bytes: overlay(self.engine.sniff_bytes, over.engine.sniff_bytes),
            },
            tree: self.tree.merge(over.tree),
            content: self.content.merge(over.content),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(level) = &self.logging.level
            && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
        {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got {level:?}"
            )));
        }
        validate_engine(
            self.channel_capacity(),
            self.engine.chunk_size.unwrap_or_else(default_chunk_size),
            self.engine.sniff_bytes.unwrap_or_else(default_sniff_bytes),
        )?;
        for kind in [CommandKind::Tree, CommandKind::Content] {
            let command = self.command(kind);
            if let Some(format) = &command.format {
                validate_format(format).map_err(|_| {
                    ConfigError::Validation(format!(
                        "{}.format must be one of {SUPPORTED_FORMATS:?}, got {format:?}",
                        kind.as_str()
                    ))
                })?;
            }
            if command.tokens.enabled == Some(true)
                && command.tokens.model.as_deref().is_some_and(|m| m.trim().is_empty())
            {
                return Err(ConfigError::Validation(format!(
                    "{}.tokens.model must not be empty when tokens are enabled",
                    kind.as_str()
                )));
            }
        }
        Ok(())
    }

    pub fn command(&self, kind: CommandKind) -> &CommandConfig {
        match kind {
            CommandKind::Tree => &self.tree,
            CommandKind::Content => &self.content,
        }
    }

    pub fn log_level(&self) -> String {
        self.logging.level.clone().unwrap_or_else(default_log_level)
    }

    pub fn channel_capacity(&self) -> usize {
        self.engine.channel_capacity.unwrap_or_else(default_channel_capacity)
    }

    /// Resolve the settings for one command: overrides, then config, then
    /// built-in defaults.
    pub fn stream_settings(
        &self,
        kind: CommandKind,
        overrides: StreamOverrides,
    ) -> Result<StreamSettings, ConfigError> {
        let command = self.command(kind);
        let exclude = if overrides.exclude.is_empty() {
            command.paths.exclude.clone().unwrap_or_default()
        } else {
            overrides.exclude
        };
        let settings = StreamSettings {
            format: overrides
                .format
                .or_else(|| command.format.clone())
                .unwrap_or_else(default_format)
                .trim()
                .to_ascii_lowercase(),
            summary: overrides.summary.or(command.summary).unwrap_or(true),
            content: overrides
                .content
                .or(command.content)
                .unwrap_or(kind.default_content()),
            tokens: overrides.tokens.or(command.tokens.enabled).unwrap_or(false),
            model: overrides
                .model
                .or_else(|| command.tokens.model.clone())
                .unwrap_or_else(default_model),
            exclude: dedup_patterns(exclude),
            use_gitignore: !overrides.no_gitignore && command.paths.use_gitignore.unwrap_or(true),
            use_ignore: !overrides.no_ignore && command.paths.use_ignore.unwrap_or(true),
            include_git: overrides.include_git || command.paths.include_git.unwrap_or(false),
            channel_capacity: self.channel_capacity(),
            chunk_size: self.engine.chunk_size.unwrap_or_else(default_chunk_size),
            sniff_bytes: self.engine.sniff_bytes.unwrap_or_else(default_sniff_bytes),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Every key set to its built-in default.
    pub fn builtin() -> AppConfig {
        let command = |kind: CommandKind| CommandConfig {
            format: Some(default_format()),
            summary: Some(true),
            content: Some(kind.default_content()),
            tokens: TokensConfig {
                enabled: Some(false),
                model: Some(default_model()),
            },
            paths: PathsConfig {
                exclude: Some(Vec::new()),
                use_gitignore: Some(true),
                use_ignore: Some(true),
                include_git: Some(false),
            },
        };
        AppConfig {
            logging: LoggingConfig {
                level: Some(default_log_level()),
            },
            engine: EngineConfig {
                channel_capacity: Some(default_channel_capacity()),
                chunk_size: Some(default_chunk_size()),
                sniff_bytes: Some(default_sniff_bytes()),
            },
            tree: command(CommandKind::Tree),
            content: command(CommandKind::Content),
        }
    }

    /// This configuration with unset keys filled from [`AppConfig::builtin`].
    pub fn effective(&self) -> AppConfig {
        AppConfig::builtin().merge(self.clone())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `<config_dir>/ctx/ctx.toml`, if the platform has a config directory.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_DIR).join(CONFIG_FILE_NAME))
}

async fn load_optional(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Err(ConfigError::IsDirectory(path.to_path_buf())),
        Ok(_) => AppConfig::load(path).await.map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Initialization ──────────────────────────────────────────────────────

/// Where `ctx config --init` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitTarget {
    Local,
    Global,
}

/// Default configuration written by `ctx config --init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"[logging]
level = "warn"

[engine]
channel_capacity = 64
chunk_size = 49152
sniff_bytes = 8000

[tree]
format = "toon"
summary = true
content = false

[tree.tokens]
enabled = false
model = "gpt-4o"

[tree.paths]
exclude = []
use_gitignore = true
use_ignore = true
include_git = false

[content]
format = "toon"
summary = true
content = true

[content.tokens]
enabled = false
model = "gpt-4o"

[content.paths]
exclude = []
use_gitignore = true
use_ignore = true
include_git = false
"#;

/// Write [`DEFAULT_CONFIG_TEMPLATE`] to the local or global location and
/// return the path written.
pub async fn init_config(
    target: InitTarget,
    working_dir: &Path,
    force: bool,
) -> Result<PathBuf, ConfigError> {
    let path = match target {
        InitTarget::Local => working_dir.join(CONFIG_FILE_NAME),
        InitTarget::Global => global_config_path().ok_or(ConfigError::NoConfigDir)?,
    };
    let io_err = |source| ConfigError::Io {
        path: path.clone(),
        source,
    };
    if !force && tokio::fs::try_exists(&path).await.map_err(io_err)? {
        return Err(ConfigError::AlreadyExists(path));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .await
        .map_err(io_err)?;
    Ok(path)
}
