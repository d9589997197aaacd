use std::collections::HashSet;

use cadence_schedules::{parse_time_zone, ScheduleDef};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CadenceError, Result};

pub const DEFAULT_TIME_ZONE: &str = "UTC";
pub const DEFAULT_TICK_MS: u64 = 1_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Top-level config (cadence.toml + CADENCE_* env overrides).
///
/// ```toml
/// time_zone = "Europe/London"
///
/// [timer]
/// tick_ms = 500
///
/// [[jobs]]
/// name = "standup"
/// schedule = { kind = "weekly", from = "Mon", to = "Fri", refinement = { kind = "daily", at = "09:30" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// IANA zone schedules are evaluated in unless a job overrides it.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            time_zone: default_time_zone(),
            timer: TimerConfig::default(),
            jobs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// How often the timer re-checks its jobs.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Drop intervals that ended while the timer was not running instead of
    /// firing them late.
    #[serde(default)]
    pub skip_missed_runs: bool,
    /// Capacity of the firing channel handed to consumers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            skip_missed_runs: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// One named schedule to drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub schedule: ScheduleDef,
    /// Overrides the top-level `time_zone` for this job.
    pub time_zone: Option<String>,
    /// The job completes after this many firings.
    pub max_runs: Option<u32>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Evaluate the first occurrence from here instead of from now.
    pub resume_from: Option<DateTime<Utc>>,
}

impl JobConfig {
    /// The zone this job is evaluated in, falling back to `default`.
    pub fn time_zone(&self, default: Tz) -> Result<Tz> {
        match &self.time_zone {
            Some(name) => Ok(parse_time_zone(name)?),
            None => Ok(default),
        }
    }
}

fn bool_true() -> bool {
    true
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. $CADENCE_CONFIG
    ///   3. ~/.cadence/cadence.toml
    ///
    /// Nested keys are separated by `__`, e.g. `CADENCE_TIMER__TICK_MS=250`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        if let Some(path) = config_path {
            std::fs::metadata(path)?;
        }
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CADENCE_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: CadenceConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CADENCE_").ignore(&["config"]).split("__"))
            .extract()
            .map_err(|e| CadenceError::Config(e.to_string()))?;

        config.validate()?;
        debug!(path = %path, jobs = config.jobs.len(), "configuration loaded");
        Ok(config)
    }

    /// Parse config from an in-memory TOML document, without env overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: CadenceConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| CadenceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The default evaluation zone.
    pub fn time_zone(&self) -> Result<Tz> {
        Ok(parse_time_zone(&self.time_zone)?)
    }

    pub fn job(&self, name: &str) -> Result<&JobConfig> {
        self.jobs
            .iter()
            .find(|job| job.name == name)
            .ok_or_else(|| CadenceError::JobNotFound {
                name: name.to_string(),
            })
    }

    /// Reject configs the timer could not run: bad zones, unbuildable
    /// schedules, duplicate job names, a zero tick.
    fn validate(&self) -> Result<()> {
        let default_zone = self.time_zone()?;
        if self.timer.tick_ms == 0 {
            return Err(CadenceError::Config("timer.tick_ms must be positive".into()));
        }
        if self.timer.channel_capacity == 0 {
            return Err(CadenceError::Config(
                "timer.channel_capacity must be positive".into(),
            ));
        }

        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(CadenceError::Config(format!(
                    "duplicate job name: {}",
                    job.name
                )));
            }
            job.time_zone(default_zone)?;
            job.schedule.build()?;
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_schedules::ScheduleError;

    const SAMPLE: &str = r#"
time_zone = "Europe/London"

[timer]
tick_ms = 250
skip_missed_runs = true

[[jobs]]
name = "standup"
schedule = { kind = "weekly", from = "Mon", to = "Fri", refinement = { kind = "daily", at = "09:30" } }

[[jobs]]
name = "payroll"
time_zone = "America/New_York"
max_runs = 12
resume_from = "2024-06-01T00:00:00Z"

[jobs.schedule]
kind = "monthly"
on_day = -1
"#;

    #[test]
    fn parses_sample() {
        let config = CadenceConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.time_zone().unwrap(), chrono_tz::Europe::London);
        assert_eq!(config.timer.tick_ms, 250);
        assert!(config.timer.skip_missed_runs);
        assert_eq!(config.timer.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.jobs.len(), 2);

        let standup = config.job("standup").unwrap();
        assert!(standup.enabled);
        assert_eq!(standup.max_runs, None);
        assert_eq!(
            standup.time_zone(chrono_tz::Europe::London).unwrap(),
            chrono_tz::Europe::London
        );

        let payroll = config.job("payroll").unwrap();
        assert_eq!(payroll.max_runs, Some(12));
        assert_eq!(
            payroll.time_zone(chrono_tz::Europe::London).unwrap(),
            chrono_tz::America::New_York
        );
        assert_eq!(
            payroll.schedule.build().unwrap().to_string(),
            "monthly on day -1"
        );
        assert!(payroll.resume_from.is_some());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = CadenceConfig::from_toml_str("").unwrap();
        assert_eq!(config.time_zone, DEFAULT_TIME_ZONE);
        assert_eq!(config.timer.tick_ms, DEFAULT_TICK_MS);
        assert!(!config.timer.skip_missed_runs);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn unknown_job_is_reported_by_name() {
        let config = CadenceConfig::default();
        let err = config.job("missing").unwrap_err();
        assert!(matches!(err, CadenceError::JobNotFound { ref name } if name == "missing"));
        assert_eq!(err.code(), "JOB_NOT_FOUND");
    }

    #[test]
    fn rejects_unknown_time_zones() {
        let err = CadenceConfig::from_toml_str(r#"time_zone = "Mars/Olympus""#).unwrap_err();
        assert!(matches!(
            err,
            CadenceError::Schedule(ScheduleError::UnknownTimeZone(_))
        ));
    }

    #[test]
    fn rejects_duplicate_job_names() {
        let toml = r#"
[[jobs]]
name = "a"
schedule = { kind = "now" }

[[jobs]]
name = "a"
schedule = { kind = "now" }
"#;
        let err = CadenceConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, CadenceError::Config(ref msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_unbuildable_schedules() {
        let toml = r#"
[[jobs]]
name = "broken"
schedule = { kind = "monthly", on_day = 0 }
"#;
        let err = CadenceConfig::from_toml_str(toml).unwrap_err();
        assert_eq!(err.code(), "SCHEDULE_ERROR");
    }

    #[test]
    fn missing_explicit_path_is_an_io_error() {
        let err = CadenceConfig::load(Some("/definitely/not/here/cadence.toml")).unwrap_err();
        assert!(matches!(err, CadenceError::Io(_)));
    }
}
