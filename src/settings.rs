//! Engine settings and configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunables for a conversation session
///
/// Settings are stored in JSON format and can be loaded/saved from disk.
/// Missing fields fall back to their defaults.
///
/// # Example
/// ```rust,no_run
/// use threadline::settings::EngineSettings;
///
/// // Load settings (returns default if file doesn't exist)
/// let settings = EngineSettings::load("threadline.json").expect("Failed to load");
///
/// println!("History page size: {}", settings.page_size);
/// println!("Typing idle timeout: {} ms", settings.typing_idle_ms);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of messages requested per history page
    pub page_size: u32,
    /// Idle time after the last keystroke before typing stops (milliseconds)
    pub typing_idle_ms: u64,
    /// Maximum distance between a pending send and an incoming message for
    /// the content heuristic to pair them (milliseconds)
    pub reconcile_window_ms: u64,
    /// Pair uncorrelated incoming messages with pending sends by content
    pub heuristic_reconcile: bool,
    /// Interval of the driver's presence tick (milliseconds)
    pub tick_interval_ms: u64,
}

impl EngineSettings {
    /// Load settings from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    /// The loaded settings, or default settings if the file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Settings(format!("Failed to read settings: {}", e)))?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Settings(format!("Failed to parse settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a JSON file
    ///
    /// Creates the parent directory when it is missing.
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Settings(format!("Failed to create settings directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;

        std::fs::write(path, json)
            .map_err(|e| Error::Settings(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Settings("page_size must be greater than zero".to_string()));
        }
        if self.typing_idle_ms == 0 {
            return Err(Error::Settings(
                "typing_idle_ms must be greater than zero".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Settings(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 30,
            typing_idle_ms: 2_000,
            reconcile_window_ms: 10_000,
            heuristic_reconcile: true,
            tick_interval_ms: 250,
        }
    }
}
