//! # Configuration
//! Comes from the process arguments, no CLI framework involved:
//! the first one is the lock [Variant], the rest are `key=value` [Setting]s.
//!
//! ```text
//! rw-turnstile naive readers=16 writers=2 growth_ms=0 hold_ms=200 run_ms=5000
//! ```
//!
//! Durations are in milliseconds, `growth_ms=0` disables growth, `run_ms=0` waits for stdin.

use std::{fmt, str::FromStr, time::Duration};

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{error::ConfigError, pool::Timing, rwlock::Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Setting {
    Readers,
    Writers,
    GrowthMs,
    SampleMs,
    HoldMs,
    RestMs,
    MaxReaders,
    RunMs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub variant: Variant,
    /// initial population
    pub readers: usize,
    pub writers: usize,
    /// one more reader per interval, None - no growth
    pub growth_interval: Option<Duration>,
    pub sample_interval: Duration,
    pub hold: Duration,
    pub rest: Duration,
    pub max_readers: Option<usize>,
    /// None - until a line (or EOF) on stdin
    pub run_for: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: Variant::Fair,
            readers: 50,
            writers: 6,
            growth_interval: Some(Duration::from_millis(90)),
            sample_interval: Duration::from_millis(100),
            hold: Duration::from_secs(1),
            rest: Duration::from_secs(1),
            max_readers: None,
            run_for: None,
        }
    }
}

/// comma-separated list of what an enum accepts
pub fn one_of<E: IntoEnumIterator + fmt::Display>() -> String {
    E::iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

impl Config {
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let mut args = args.into_iter();
        let mut config = Config::default();

        if let Some(variant) = args.next() {
            config.variant = Variant::from_str(&variant)
                .map_err(|_| ConfigError::UnknownVariant(variant, one_of::<Variant>()))?;
        }
        for pair in args {
            config.apply(&pair)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, pair: &str) -> Result<(), ConfigError> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::Malformed(pair.to_string()))?;
        let setting = Setting::from_str(key.trim())
            .map_err(|_| ConfigError::UnknownSetting(key.to_string(), one_of::<Setting>()))?;
        let number: u64 = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber {
                setting: setting.to_string(),
                value: value.to_string(),
            })?;
        let count = usize::try_from(number).map_err(|_| ConfigError::InvalidNumber {
            setting: setting.to_string(),
            value: value.to_string(),
        })?;
        let millis = Duration::from_millis(number);

        match setting {
            Setting::Readers => self.readers = count,
            Setting::Writers => self.writers = count,
            Setting::GrowthMs => self.growth_interval = (number > 0).then_some(millis),
            Setting::SampleMs => self.sample_interval = millis,
            Setting::HoldMs => self.hold = millis,
            Setting::RestMs => self.rest = millis,
            Setting::MaxReaders => self.max_readers = Some(count),
            Setting::RunMs => self.run_for = (number > 0).then_some(millis),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval.is_zero() {
            return Err(ConfigError::Zero("sample_ms"));
        }
        if self.readers == 0 && self.writers == 0 && self.growth_interval.is_none() {
            return Err(ConfigError::Empty);
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            hold: self.hold,
            rest: self.rest,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(Vec::new()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.variant, Variant::Fair);
        assert_eq!(config.readers, 50);
        assert_eq!(config.writers, 6);
    }

    #[test]
    fn test_settings() {
        let config = Config::from_args(args(
            "naive readers=16 writers=2 growth_ms=0 sample_ms=20 hold_ms=5 rest_ms=7 max_readers=40 run_ms=3000",
        ))
        .unwrap();
        assert_eq!(config.variant, Variant::Naive);
        assert_eq!(config.readers, 16);
        assert_eq!(config.writers, 2);
        assert_eq!(config.growth_interval, None);
        assert_eq!(config.sample_interval, Duration::from_millis(20));
        assert_eq!(
            config.timing(),
            Timing {
                hold: Duration::from_millis(5),
                rest: Duration::from_millis(7)
            }
        );
        assert_eq!(config.max_readers, Some(40));
        assert_eq!(config.run_for, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_bad_settings() {
        assert!(matches!(
            Config::from_args(args("fastest")),
            Err(ConfigError::UnknownVariant(v, _)) if v == "fastest"
        ));
        assert!(matches!(
            Config::from_args(args("fair speed=3")),
            Err(ConfigError::UnknownSetting(k, list)) if k == "speed" && list.contains("hold_ms")
        ));
        assert_eq!(
            Config::from_args(args("fair readers")),
            Err(ConfigError::Malformed("readers".to_string()))
        );
        assert_eq!(
            Config::from_args(args("fair hold_ms=-1")),
            Err(ConfigError::InvalidNumber {
                setting: "hold_ms".to_string(),
                value: "-1".to_string()
            })
        );
        assert_eq!(
            Config::from_args(args("fair sample_ms=0")),
            Err(ConfigError::Zero("sample_ms"))
        );
        assert_eq!(
            Config::from_args(args("fair readers=0 writers=0 growth_ms=0")),
            Err(ConfigError::Empty)
        );
    }
}
