use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::enroll::enroller::{Enroller, SubmitError};
use crate::obs::{EnrollOutcome, SeatChecker, SeatReport};
use crate::utils::fmt_duration;

/// Result of one poll of the schedule pages.
#[derive(Debug)]
pub struct WatchCycle {
    pub report: SeatReport,
    /// Watched CRNs with at least one open seat, in watch order.
    pub open: Vec<String>,
    /// Present when an enrollment request was sent for `open`.
    pub outcome: Option<EnrollOutcome>,
}

/// Polls seat availability and enrolls in sections as soon as seats open.
pub struct SeatWatcher {
    enroller: Arc<Enroller>,
    checker: SeatChecker,
    watch: Vec<String>,
    drops: Vec<String>,
    interval: Duration,
}

impl SeatWatcher {
    pub fn new(
        enroller: Arc<Enroller>,
        checker: SeatChecker,
        watch: Vec<String>,
        drops: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            enroller,
            checker,
            watch,
            drops,
            interval,
        }
    }

    /// Run until `cancel` fires, polling every `interval`.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            crns = ?self.watch,
            branches = ?self.checker.branches().collect::<Vec<_>>(),
            interval = fmt_duration(self.interval),
            "Seat watcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.check_once() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Seat watch cycle failed");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(self.interval) => {}
            }
        }

        info!("Seat watcher stopped");
    }

    /// Make sure a token is at hand, read the seat tables, and enroll in
    /// whatever is open.
    pub async fn check_once(&self) -> Result<WatchCycle, SubmitError> {
        // Log in before scraping so an open seat is not lost to a slow login.
        self.enroller.tokens().ensure().await?;

        let report = self
            .checker
            .check(self.enroller.client(), &self.watch)
            .await;
        self.log_report(&report);

        let open = report.open_crns(&self.watch);
        if open.is_empty() {
            debug!("No open seats in watched sections");
            return Ok(WatchCycle {
                report,
                open,
                outcome: None,
            });
        }

        info!(crns = ?open, "Open seats found, enrolling");
        let outcome = self.enroller.submit(&open, &self.drops).await?;
        Ok(WatchCycle {
            report,
            open,
            outcome: Some(outcome),
        })
    }

    fn log_report(&self, report: &SeatReport) {
        for crn in &self.watch {
            match report.get(crn) {
                Some(seats) if seats.is_open() => info!(
                    crn = crn.as_str(),
                    open = seats.open,
                    capacity = seats.capacity,
                    enrolled = seats.enrolled,
                    "Seats open"
                ),
                Some(seats) => debug!(
                    crn = crn.as_str(),
                    capacity = seats.capacity,
                    enrolled = seats.enrolled,
                    "Section full"
                ),
                None => warn!(crn = crn.as_str(), "CRN not found in any schedule table"),
            }
        }
    }
}
