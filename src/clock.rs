//! Wall-clock target times and a precise wait until one is reached.
//!
//! Registration opens at an exact second, so the wait gets finer as the
//! deadline approaches: long naps far out, half-second naps within the last
//! stretch, a single exact sleep under one second, and spinning for the final
//! few milliseconds.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::fmt_duration;

const COARSE_THRESHOLD: Duration = Duration::from_secs(1);
const COARSE_STEP: Duration = Duration::from_millis(500);
const SPIN_THRESHOLD: Duration = Duration::from_millis(20);
const MAX_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetTimeError {
    #[error("expected HH:MM:SS[.fff], got {0:?}")]
    Format(String),
    #[error("time out of range: {0:?}")]
    OutOfRange(String),
    #[error("{0} does not exist in the local timezone today")]
    NonexistentLocalTime(TargetTime),
}

/// A time of day, with millisecond precision, at which to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub micros: u32,
}

impl TargetTime {
    /// Parse `HH:MM:SS.fff`. A comma also separates the fraction, which is
    /// read as milliseconds: padded with zeros or cut to three digits.
    pub fn parse(raw: &str) -> Result<Self, TargetTimeError> {
        let normalized = raw.trim().replace(',', ".");
        let (clock, fraction) = normalized
            .split_once('.')
            .unwrap_or((normalized.as_str(), ""));

        let fields: Vec<&str> = clock.split(':').collect();
        let [hour, minute, second] = fields.as_slice() else {
            return Err(TargetTimeError::Format(raw.to_string()));
        };
        let field = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| TargetTimeError::Format(raw.to_string()))
        };
        let (hour, minute, second) = (field(hour)?, field(minute)?, field(second)?);

        let millis: String = fraction.chars().chain(std::iter::repeat('0')).take(3).collect();
        if !millis.chars().all(|c| c.is_ascii_digit()) {
            return Err(TargetTimeError::Format(raw.to_string()));
        }
        let micros = millis
            .parse::<u32>()
            .map_err(|_| TargetTimeError::Format(raw.to_string()))?
            * 1000;

        let target = Self {
            hour,
            minute,
            second,
            micros,
        };
        target
            .naive_time()
            .ok_or_else(|| TargetTimeError::OutOfRange(raw.to_string()))?;
        Ok(target)
    }

    pub fn naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_micro_opt(self.hour, self.minute, self.second, self.micros)
    }

    /// This time of day on today's local date.
    pub fn today(&self) -> Result<DateTime<Local>, TargetTimeError> {
        let time = self
            .naive_time()
            .ok_or(TargetTimeError::NonexistentLocalTime(*self))?;
        let naive = Local::now().date_naive().and_time(time);
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or(TargetTimeError::NonexistentLocalTime(*self))
    }
}

impl FromStr for TargetTime {
    type Err = TargetTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            self.hour,
            self.minute,
            self.second,
            self.micros / 1000
        )
    }
}

/// Next action while waiting for a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    Done,
    /// Sleep, then refresh the token before looking at the clock again.
    SleepThenRefresh(Duration),
    Sleep(Duration),
    Spin,
}

/// Decide the next step given the time left until the deadline.
///
/// `remaining` is `None` once the deadline has passed.
pub fn plan_wait(remaining: Option<Duration>, refresh_every: Option<Duration>) -> WaitStep {
    let remaining = match remaining {
        Some(r) if !r.is_zero() => r,
        _ => return WaitStep::Done,
    };

    if let Some(interval) = refresh_every
        && remaining > interval + refresh_margin(interval)
    {
        return WaitStep::SleepThenRefresh(interval);
    }

    if remaining > COARSE_THRESHOLD {
        WaitStep::Sleep(COARSE_STEP.min(remaining / 2))
    } else if remaining > SPIN_THRESHOLD {
        WaitStep::Sleep(remaining)
    } else {
        WaitStep::Spin
    }
}

/// Time that must be left after a refresh nap for the login to finish before
/// the deadline.
fn refresh_margin(interval: Duration) -> Duration {
    (interval / 4).min(MAX_REFRESH_MARGIN)
}

/// Time left until `deadline`, or `None` if it has passed.
fn remaining_until(deadline: DateTime<Local>) -> Option<Duration> {
    (deadline - Local::now()).to_std().ok()
}

/// Wait until the local wall clock reaches `deadline`.
///
/// While more than `refresh_every` (plus a margin for the login) remains,
/// `refresh` runs after each such interval so the token is fresh at the
/// deadline. Returns `false` if
/// cancelled first.
pub async fn wait_until<F, Fut>(
    deadline: DateTime<Local>,
    refresh_every: Option<Duration>,
    mut refresh: F,
    cancel: &CancellationToken,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if let Some(remaining) = remaining_until(deadline) {
        info!(
            deadline = %deadline.format("%H:%M:%S%.3f"),
            remaining = fmt_duration(remaining),
            "Waiting for target time"
        );
    }

    loop {
        if cancel.is_cancelled() {
            return false;
        }

        match plan_wait(remaining_until(deadline), refresh_every) {
            WaitStep::Done => return true,
            WaitStep::SleepThenRefresh(nap) => {
                debug!(nap = fmt_duration(nap), "Sleeping before token refresh");
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(nap) => {}
                }
                refresh().await;
            }
            WaitStep::Sleep(nap) => {
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(nap) => {}
                }
            }
            WaitStep::Spin => {
                std::hint::spin_loop();
                tokio::task::yield_now().await;
            }
        }
    }
}
