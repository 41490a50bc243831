use crate::auth::{
    Authenticator, Credentials, ExternalCommandLogin, FormPostLogin, JsonCredentialLogin,
    LoginStrategy, SsoFormLogin, TokenStore,
};
use crate::config::{Config, Mode};
use crate::enroll::{DirectEnroller, Enroller, SeatWatcher, TimedEnrollment};
use crate::obs::{BranchCatalog, ObsClient, SeatChecker};
use crate::signals::{shutdown_signal, shutdown_tasks};
use crate::targets::{CourseTargets, parse_course_targets, parse_crn_list};
use crate::utils::fmt_duration;
use anyhow::Context;
use reqwest::Url;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    mode: Mode,
    enroller: Arc<Enroller>,
}

impl App {
    /// Wire the portal client, login strategies and token store.
    pub fn new(config: Config, mode_override: Option<Mode>) -> Result<Self, anyhow::Error> {
        let mode = mode_override.unwrap_or(config.mode);

        let client = ObsClient::new(&config.obs_base_url).context("Failed to create OBS client")?;
        let login_base = Url::parse(&with_trailing_slash(config.login_base_url()))
            .with_context(|| format!("Invalid login base URL: {}", config.login_base_url()))?;

        let strategies = build_strategies(&config, &client, &login_base);
        let authenticator = Authenticator::new(
            Credentials::new(config.itu_username.clone(), config.itu_password.clone()),
            strategies,
        );
        info!(
            strategies = ?authenticator.strategy_names(),
            login_base = %login_base,
            "Login strategies configured"
        );

        let tokens = Arc::new(TokenStore::new(authenticator));
        let enroller = Arc::new(Enroller::new(Arc::new(client), tokens));

        Ok(App {
            config,
            mode,
            enroller,
        })
    }

    /// Run the configured mode until it finishes or a shutdown signal arrives.
    pub async fn run(self) -> ExitCode {
        info!(mode = ?self.mode, "Starting");
        match self.mode {
            Mode::Watch => self.run_watch().await,
            Mode::Time => self.run_timed().await,
        }
    }

    async fn run_watch(self) -> ExitCode {
        let targets = parse_course_targets(&self.config.watch_crns);
        if targets.is_empty() {
            error!("WATCH_CRNS has no valid BRANCH:CRN entries");
            return ExitCode::FAILURE;
        }
        let drops = parse_crn_list(&self.config.drop_crns);

        info!(
            crns = ?targets.crns(),
            drops = ?drops,
            poll_interval = fmt_duration(self.config.retry_interval_seconds),
            direct_interval = fmt_duration(self.config.direct_enroll_interval_seconds),
            "Watch mode configured"
        );

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        // Without schedule pages there is nothing to poll, but direct
        // enrollment still works.
        let pages = self.seat_pages(&targets);
        if pages.is_empty() {
            warn!("No schedule pages for the watched branches, seat watching disabled");
        } else {
            let watcher = SeatWatcher::new(
                self.enroller.clone(),
                SeatChecker::new(pages),
                targets.crns(),
                drops.clone(),
                self.config.retry_interval_seconds,
            );
            let watcher_task = tokio::spawn({
                let cancel = cancel.clone();
                async move { watcher.run(cancel).await }
            });
            tasks.push(("seat-watcher", watcher_task));
        }

        let direct = DirectEnroller::new(
            self.enroller.clone(),
            targets.crns(),
            drops,
            self.config.direct_enroll_interval_seconds,
        );
        let direct_task = tokio::spawn({
            let cancel = cancel.clone();
            async move { direct.run(cancel).await }
        });
        tasks.push(("direct-enroller", direct_task));

        shutdown_signal().await;
        shutdown_tasks(tasks, &cancel, self.config.shutdown_timeout).await
    }

    /// Schedule search pages for the watched branches.
    ///
    /// Empty when the catalog cannot be loaded or knows none of the codes.
    fn seat_pages(&self, targets: &CourseTargets) -> Vec<(String, String)> {
        match BranchCatalog::load(&self.config.branch_codes_file) {
            Ok(catalog) => {
                info!(branches = catalog.len(), "Branch catalog loaded");
                catalog.schedule_urls(
                    &self.enroller.client().schedule_search_url(),
                    &self.config.program_level,
                    &targets.branches(),
                )
            }
            Err(e) => {
                warn!(error = ?e, "Branch catalog unavailable");
                Vec::new()
            }
        }
    }

    async fn run_timed(self) -> ExitCode {
        let targets = parse_course_targets(&self.config.time_crns);
        if targets.is_empty() {
            error!("TIME_CRNS has no valid BRANCH:CRN entries");
            return ExitCode::FAILURE;
        }

        let timed = TimedEnrollment::new(
            self.enroller.clone(),
            targets.crns(),
            parse_crn_list(&self.config.drop_crns),
            self.config.target_time,
            self.config.token_refresh_interval,
        );

        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                shutdown_signal().await;
                cancel.cancel();
            }
        });

        match timed.run(&cancel).await {
            Ok(Some(outcome)) if outcome.success => ExitCode::SUCCESS,
            Ok(Some(_)) => ExitCode::FAILURE,
            Ok(None) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "Timed enrollment failed");
                ExitCode::FAILURE
            }
        }
    }
}

/// Login strategies in the order they are tried.
///
/// The helper command, when configured, goes first: it is the only one able
/// to get past a JavaScript-driven SSO page.
fn build_strategies(
    config: &Config,
    client: &ObsClient,
    login_base: &Url,
) -> Vec<Box<dyn LoginStrategy>> {
    let mut strategies: Vec<Box<dyn LoginStrategy>> = Vec::new();

    if let Some(line) = config.login_command.as_deref() {
        match ExternalCommandLogin::from_command_line(line) {
            Some(command) => strategies.push(Box::new(command)),
            None => warn!("LOGIN_COMMAND is blank, skipping the helper"),
        }
    }

    strategies.push(Box::new(SsoFormLogin::new(
        client.clone(),
        login_base.clone(),
    )));
    strategies.push(Box::new(JsonCredentialLogin::new(
        client.http().clone(),
        login_base.clone(),
    )));
    strategies.push(Box::new(FormPostLogin::new(
        client.http().clone(),
        login_base.clone(),
    )));

    strategies
}

fn with_trailing_slash(url: &str) -> String {
    let url = url.trim();
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
