use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::enroll::enroller::{Enroller, SubmitError};
use crate::obs::EnrollOutcome;
use crate::utils::fmt_duration;

/// Submits every watched CRN on a fixed interval, regardless of seat data.
///
/// The schedule tables lag behind the registration system, so a seat can be
/// taken before the watcher ever sees it open.
pub struct DirectEnroller {
    enroller: Arc<Enroller>,
    crns: Vec<String>,
    drops: Vec<String>,
    interval: Duration,
}

impl DirectEnroller {
    pub fn new(
        enroller: Arc<Enroller>,
        crns: Vec<String>,
        drops: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            enroller,
            crns,
            drops,
            interval,
        }
    }

    /// Sleep one interval, submit, repeat until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            crns = ?self.crns,
            interval = fmt_duration(self.interval),
            "Direct enroller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(self.interval) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.submit_once() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Direct enrollment attempt failed");
                    }
                }
            }
        }

        info!("Direct enroller stopped");
    }

    pub async fn submit_once(&self) -> Result<EnrollOutcome, SubmitError> {
        info!(crns = ?self.crns, "Direct enrollment attempt");
        self.enroller.submit(&self.crns, &self.drops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::counting_token;
    use crate::enroll::enroller::testing::{crns, enroller_for};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_submits_all_crns_with_drops() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ders-kayit/v21"))
            .and(body_json(json!({"ECRN": ["23603", "23622"], "SCRN": ["21000"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (enroller, _) = enroller_for(&server, counting_token);
        let direct = DirectEnroller::new(
            Arc::new(enroller),
            crns(&["23603", "23622"]),
            crns(&["21000"]),
            Duration::from_secs(120),
        );

        assert!(direct.submit_once().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_run_waits_before_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(0)
            .mount(&server)
            .await;

        let (enroller, _) = enroller_for(&server, counting_token);
        let direct = DirectEnroller::new(
            Arc::new(enroller),
            crns(&["23603"]),
            Vec::new(),
            Duration::from_secs(60),
        );

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        time::timeout(Duration::from_secs(2), direct.run(cancel))
            .await
            .expect("direct enroller should stop after cancellation");
    }
}
