//! Configuration module for the enrollment bot.
//!
//! Values come from the process environment (after `.env` is loaded), layered
//! over an optional `obs-enroll.toml` in the working directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::clock::TargetTime;
use crate::obs::DEFAULT_BASE_URL;

pub const CONFIG_FILE: &str = "obs-enroll.toml";

/// Keys taken verbatim from the environment. `Env` parses values, so
/// `ITU_PASSWORD=00123456` would otherwise arrive as the number `123456`.
const TEXT_KEYS: &[&str] = &[
    "mode",
    "itu_username",
    "itu_password",
    "target_time",
    "watch_crns",
    "time_crns",
    "drop_crns",
    "obs_base_url",
    "obs_login_base_url",
    "program_level",
    "branch_codes_file",
    "login_command",
    "log_level",
];

/// Which flow the bot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Wait for a fixed wall-clock time and enroll once.
    Time,
    /// Poll seats and enroll whenever one opens, plus periodic blind attempts.
    #[default]
    Watch,
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_uppercase().as_str() {
            "TIME" => Ok(Mode::Time),
            "WATCH" => Ok(Mode::Watch),
            other => Err(de::Error::custom(format!(
                "unknown mode {other:?}, expected TIME or WATCH"
            ))),
        }
    }
}

/// Main configuration struct
#[derive(Clone, Deserialize, custom_debug_derive::Debug)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,

    #[serde(deserialize_with = "credential")]
    pub itu_username: String,
    #[serde(deserialize_with = "credential")]
    #[debug(with = crate::fmt::redacted)]
    pub itu_password: String,

    /// Local time of day at which TIME mode submits.
    #[serde(
        default = "default_target_time",
        deserialize_with = "deserialize_target_time"
    )]
    pub target_time: TargetTime,

    /// Seat poll interval, also the pause after a failed login.
    #[serde(
        default = "default_retry_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub retry_interval_seconds: Duration,
    #[serde(
        default = "default_direct_enroll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub direct_enroll_interval_seconds: Duration,
    #[serde(
        default = "default_token_refresh_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub token_refresh_interval: Duration,

    /// `BRANCH:CRN` pairs watched in WATCH mode.
    #[serde(default, deserialize_with = "lossy_string")]
    pub watch_crns: String,
    /// `BRANCH:CRN` pairs submitted in TIME mode.
    #[serde(default, deserialize_with = "lossy_string")]
    pub time_crns: String,
    /// Plain CRNs dropped in the same request.
    #[serde(default, deserialize_with = "lossy_string")]
    pub drop_crns: String,

    #[serde(default = "default_base_url")]
    pub obs_base_url: String,
    /// Where login starts; falls back to `obs_base_url`.
    #[serde(default)]
    #[debug(with = crate::fmt::opt)]
    pub obs_login_base_url: Option<String>,
    #[serde(default = "default_program_level")]
    pub program_level: String,
    #[serde(default = "default_branch_codes_file")]
    pub branch_codes_file: PathBuf,
    /// Helper that prints a token after a browser login, tried before the
    /// built-in strategies.
    #[serde(default)]
    #[debug(with = crate::fmt::opt)]
    pub login_command: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Build the figment: the TOML file first, environment on top.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().ignore(TEXT_KEYS))
            .merge(env_text())
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn login_base_url(&self) -> &str {
        self.obs_login_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(&self.obs_base_url)
    }
}

/// The `TEXT_KEYS` present in the environment, unparsed.
fn env_text() -> Serialized<BTreeMap<&'static str, String>> {
    let values = TEXT_KEYS
        .iter()
        .filter_map(|key| {
            std::env::var(key.to_ascii_uppercase())
                .ok()
                .map(|value| (*key, value))
        })
        .collect();
    Serialized::defaults(values)
}

fn default_target_time() -> TargetTime {
    TargetTime {
        hour: 14,
        minute: 0,
        second: 0,
        micros: 400_000,
    }
}

fn default_retry_interval() -> Duration {
    Duration::from_millis(3120)
}

fn default_direct_enroll_interval() -> Duration {
    Duration::from_secs(120)
}

fn default_token_refresh_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_program_level() -> String {
    "LS".to_string()
}

fn default_branch_codes_file() -> PathBuf {
    PathBuf::from("derskodları.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Accepts `3.12`, `120`, `15m`, `2h` and similar.
const DURATION_PARSER: DurationParser = DurationParser::builder()
    .all_time_units()
    .default_unit(TimeUnit::Second)
    .build();

/// Parse a duration from a bare number of seconds or a `fundu` string.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|e| format!("{raw:?}: {e}"));
    }
    let parsed = DURATION_PARSER
        .parse(raw)
        .map_err(|e| format!("{raw:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("{raw:?}: {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number of seconds or a duration string like \"15m\"")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("negative duration: {value}")))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Duration, E> {
            Duration::try_from_secs_f64(value).map_err(|e| E::custom(format!("{value}: {e}")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

/// Accept strings, numbers and booleans as text.
///
/// Only the TOML file can still hand these over typed, e.g.
/// `itu_username = 150200001`.
fn lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct LossyStringVisitor;

    impl<'de> Visitor<'de> for LossyStringVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<String, E> {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(LossyStringVisitor)
}

/// Trimmed, and rejected when blank.
fn credential<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = lossy_string(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(de::Error::custom("must not be blank"));
    }
    Ok(trimmed.to_string())
}

fn deserialize_target_time<'de, D>(deserializer: D) -> Result<TargetTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = lossy_string(deserializer)?;
    TargetTime::parse(&raw).map_err(de::Error::custom)
}
