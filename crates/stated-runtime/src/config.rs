//! Runtime configuration.

use std::path::PathBuf;

use stated_events::DEFAULT_HISTORY_LIMIT;

/// Default name of the collection file inside the state directory.
pub const DEFAULT_STORAGE_FILE: &str = "stated.json";

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory holding the collection file.
    pub state_dir: PathBuf,
    /// Name of the collection file.
    pub storage_file: String,
    /// How many recent events the event bus keeps.
    pub event_history: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".stated"),
            storage_file: DEFAULT_STORAGE_FILE.to_string(),
            event_history: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl RuntimeConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Sets the collection file name.
    pub fn with_storage_file(mut self, file: impl Into<String>) -> Self {
        self.storage_file = file.into();
        self
    }

    /// Sets the event history size.
    pub fn with_event_history(mut self, size: usize) -> Self {
        self.event_history = size;
        self
    }

    /// Returns the full path of the collection file.
    pub fn storage_path(&self) -> PathBuf {
        self.state_dir.join(&self.storage_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert_eq!(config.state_dir, PathBuf::from(".stated"));
        assert_eq!(config.storage_file, "stated.json");
        assert_eq!(config.event_history, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn test_config_builder() {
        let config = RuntimeConfig::new()
            .with_state_dir("/var/lib/stated")
            .with_storage_file("vars.json")
            .with_event_history(16);

        assert_eq!(config.storage_path(), PathBuf::from("/var/lib/stated/vars.json"));
        assert_eq!(config.event_history, 16);
    }
}
