//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use ctx_config::{AppConfig, CommandConfig};

/// Fluent builder for [`AppConfig`] in tests. Command options apply to
/// both `tree` and `content`.
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    fn each_command(mut self, f: impl Fn(&mut CommandConfig)) -> Self {
        f(&mut self.config.tree);
        f(&mut self.config.content);
        self
    }

    pub fn format(self, format: &str) -> Self {
        self.each_command(|c| c.format = Some(format.to_string()))
    }

    pub fn summary(self, enabled: bool) -> Self {
        self.each_command(|c| c.summary = Some(enabled))
    }

    pub fn tokens(self, model: &str) -> Self {
        self.each_command(|c| {
            c.tokens.enabled = Some(true);
            c.tokens.model = Some(model.to_string());
        })
    }

    pub fn exclude(self, patterns: &[&str]) -> Self {
        self.each_command(|c| {
            c.paths.exclude = Some(patterns.iter().map(|p| p.to_string()).collect());
        })
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = Some(level.to_string());
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.engine.channel_capacity = Some(capacity);
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.engine.chunk_size = Some(size);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// The built config as TOML, for writing a `ctx.toml` fixture.
    pub fn to_toml(self) -> String {
        self.config.to_toml().expect("test config serializes")
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
