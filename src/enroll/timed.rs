use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::{TargetTime, wait_until};
use crate::enroll::enroller::Enroller;
use crate::obs::EnrollOutcome;

/// One enrollment request fired at a fixed local time.
pub struct TimedEnrollment {
    enroller: Arc<Enroller>,
    crns: Vec<String>,
    drops: Vec<String>,
    target: TargetTime,
    refresh_every: Duration,
}

impl TimedEnrollment {
    pub fn new(
        enroller: Arc<Enroller>,
        crns: Vec<String>,
        drops: Vec<String>,
        target: TargetTime,
        refresh_every: Duration,
    ) -> Self {
        Self {
            enroller,
            crns,
            drops,
            target,
            refresh_every,
        }
    }

    /// Wait for today's target time and submit once.
    ///
    /// Returns `None` if cancelled before the target time.
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<Option<EnrollOutcome>> {
        let deadline = self
            .target
            .today()
            .context("Failed to resolve target time")?;
        self.run_until(deadline, cancel).await
    }

    pub(crate) async fn run_until(
        &self,
        deadline: DateTime<Local>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<EnrollOutcome>> {
        let tokens = self.enroller.tokens();

        // Log in early; a failure here is retried at each refresh and again
        // right before sending.
        if let Err(e) = tokens.ensure().await {
            warn!(error = %e, "Initial login failed");
        }

        if deadline <= Local::now() {
            warn!(target = %self.target, "Target time already passed, submitting now");
        }

        let reached = wait_until(
            deadline,
            Some(self.refresh_every),
            || async move {
                // Failures are logged by the store and the old token is kept.
                let _ = tokens.refresh().await;
            },
            cancel,
        )
        .await;
        if !reached {
            info!("Cancelled before target time");
            return Ok(None);
        }

        info!(target = %self.target, crns = ?self.crns, "Target time reached");
        match self.enroller.submit(&self.crns, &self.drops).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if e.is_unauthorized() => {
                // The stale token is already dropped; submit logs in again.
                warn!("Token expired at send time, resending once");
                let outcome = self
                    .enroller
                    .submit(&self.crns, &self.drops)
                    .await
                    .context("Enrollment retry failed")?;
                Ok(Some(outcome))
            }
            Err(e) => Err(e).context("Enrollment request failed"),
        }
    }
}
