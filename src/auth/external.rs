//! Login through an external helper program, typically a headless-browser
//! script that walks the SSO pages and prints the JWT.
//!
//! The helper receives the credentials in `ITU_USERNAME` / `ITU_PASSWORD` and
//! must print the token (bare, or as JSON) on stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::auth::token::token_from_jwt_body;
use crate::auth::{Credentials, LoginError, LoginOutcome, LoginStrategy};

const MAX_ATTEMPTS: usize = 3;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ExternalCommandLogin {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalCommandLogin {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_once(&self, credentials: &Credentials) -> Result<String, LoginError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env("ITU_USERNAME", &credentials.username)
            .env("ITU_PASSWORD", &credentials.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LoginError::Command(format!("failed to spawn {}: {e}", self.program)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                LoginError::Command(format!("{} timed out after {:?}", self.program, self.timeout))
            })?
            .map_err(|e| LoginError::Command(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoginError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LoginStrategy for ExternalCommandLogin {
    fn name(&self) -> &'static str {
        "external-command"
    }

    async fn attempt(&self, credentials: &Credentials) -> Result<LoginOutcome, LoginError> {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.run_once(credentials).await {
                Ok(stdout) => {
                    if let Some(token) = token_from_jwt_body(&stdout) {
                        return Ok(LoginOutcome::Authenticated(token));
                    }
                    debug!(attempt, "Login command printed no token");
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Login command attempt failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(LoginOutcome::Rejected(format!(
                "{} printed no token in {MAX_ATTEMPTS} attempts",
                self.program
            ))),
        }
    }
}
