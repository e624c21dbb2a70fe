//! Language settings supplied by the host

use crate::error::Error;
use crate::segmenter::CommandSeparator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default idle lifetime of a worker, in milliseconds
pub const DEFAULT_MAXIMUM_WORKER_IDLE_TIME: i64 = 2 * 60 * 1000;

/// Worker configuration
///
/// Every field has a default, and unknown keys are ignored, so a host can
/// pass its whole editor settings object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanguageSettings {
    /// How query commands are separated
    pub command_separator: CommandSeparator,
    /// Idle time in milliseconds before the host may shut the worker down;
    /// values below `1` disable the shutdown
    pub maximum_worker_idle_time: i64,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            command_separator: CommandSeparator::default(),
            maximum_worker_idle_time: DEFAULT_MAXIMUM_WORKER_IDLE_TIME,
        }
    }
}

impl LanguageSettings {
    /// Parse settings from JSON
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Idle lifetime, `None` when the worker should never shut down
    #[must_use]
    pub fn max_worker_idle_time(&self) -> Option<Duration> {
        u64::try_from(self.maximum_worker_idle_time)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LanguageSettings::from_json("{}").unwrap();
        assert_eq!(settings, LanguageSettings::default());
        assert_eq!(settings.command_separator, CommandSeparator::BlankLine);
        assert_eq!(settings.max_worker_idle_time(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_with_unknown_keys() {
        let settings = LanguageSettings::from_json(
            r#"{"commandSeparator": "semicolon", "maximumWorkerIdleTime": 0, "formatter": {"indent": 4}}"#,
        )
        .unwrap();
        assert_eq!(settings.command_separator, CommandSeparator::Semicolon);
        assert_eq!(settings.max_worker_idle_time(), None);

        let negative = LanguageSettings::from_json(r#"{"maximumWorkerIdleTime": -5}"#).unwrap();
        assert_eq!(negative.max_worker_idle_time(), None);
    }

    #[test]
    fn test_invalid_settings() {
        let err = LanguageSettings::from_json(r#"{"commandSeparator": "comma"}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
