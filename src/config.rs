//! Runtime settings, read from an optional TOML file.
//!
//! ```toml
//! use_time_offset = true
//! cooldown_secs = 30
//!
//! [[slots]]
//! slot = 1
//! label = "alice"
//! metrics = ["weight", "bmi", "fat"]
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::publish::{LogSink, Metric, Slot, SlotRouter};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// The scale counts from 2010-01-01 instead of the Unix epoch.
    pub use_time_offset: bool,
    pub scan_enabled: bool,
    pub cooldown_secs: u64,
    pub scan_window_secs: u64,
    pub tick_millis: u64,
    pub log_spec: String,
    pub log_basename: String,
    pub slots: Vec<SlotSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotSettings {
    pub slot: u8,
    pub label: Option<String>,
    pub metrics: Option<Vec<Metric>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_time_offset: true,
            scan_enabled: true,
            cooldown_secs: 30,
            scan_window_secs: 5,
            tick_millis: 1000,
            log_spec: "info".to_string(),
            log_basename: "bs444-scale".to_string(),
            slots: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for entry in &self.slots {
            if Slot::new(entry.slot).is_none() {
                return Err(Error::InvalidSlot(entry.slot));
            }
        }
        if self.tick_millis == 0 {
            return Err(Error::Config("tick_millis must be positive".to_string()));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.scan_window_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Route the configured slots to log sinks; all slots when none are listed.
    pub fn router(&self) -> SlotRouter {
        let mut router = SlotRouter::new();
        if self.slots.is_empty() {
            for slot in Slot::all() {
                router.route(slot, Box::new(LogSink::default()), None::<Vec<Metric>>);
            }
            return router;
        }
        for entry in &self.slots {
            if let Some(slot) = Slot::new(entry.slot) {
                router.route(
                    slot,
                    Box::new(LogSink::new(entry.label.clone())),
                    entry.metrics.clone(),
                );
            }
        }
        router
    }
}
