use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::telemetry::SharedTelemetry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    #[default]
    Unknown,
    Success,
    HasError,
}

impl CommandState {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandState::HasError)
    }
}

/// Result of one command run. A payload only ever accompanies `Success`.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandOutcome<T> {
    state: CommandState,
    payload: Option<T>,
}

impl<T> CommandOutcome<T> {
    pub fn success(payload: T) -> CommandOutcome<T> {
        CommandOutcome {
            state: CommandState::Success,
            payload: Some(payload),
        }
    }

    pub fn success_empty() -> CommandOutcome<T> {
        CommandOutcome {
            state: CommandState::Success,
            payload: None,
        }
    }

    pub fn has_error() -> CommandOutcome<T> {
        CommandOutcome {
            state: CommandState::HasError,
            payload: None,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }
}

/// Raised when the surrounding run was cancelled while a command was working.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("step interrupted")]
pub struct Interrupted;

/// Build log of the current run.
pub trait StepLog {
    fn status(&self, line: &str);
    fn error(&self, err: &anyhow::Error);
}

pub type SharedStepLog = Arc<dyn StepLog + Send + Sync + 'static>;

/// Writes step lines to stderr; stdout carries command results only.
pub struct ConsoleLog<W = io::Stderr> {
    run: String,
    out: Mutex<W>,
}

impl ConsoleLog {
    pub fn new(run: &str) -> ConsoleLog {
        ConsoleLog::with_writer(run, io::stderr())
    }
}

impl<W: Write> ConsoleLog<W> {
    pub fn with_writer(run: &str, out: W) -> ConsoleLog<W> {
        ConsoleLog {
            run: run.to_string(),
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "[{}] {}", self.run, line);
        }
    }
}

impl<W: Write + Send> StepLog for ConsoleLog<W> {
    fn status(&self, line: &str) {
        self.write_line(format_args!("{}", line));
        debug!(run = %self.run, "{}", line);
    }

    fn error(&self, err: &anyhow::Error) {
        self.write_line(format_args!("ERROR: {:#}", err));
        error!(run = %self.run, error = %format!("{:#}", err), "step failed");
    }
}

#[derive(Clone, Debug)]
pub struct Workspace {
    /// Executor the workspace lives on.
    pub agent: String,
    pub dir: PathBuf,
}

pub struct JobContext {
    pub run: String,
    /// Job asking for credentials, checked against scoped entries.
    pub owner: Option<String>,
    pub workspace: Workspace,
    pub log: SharedStepLog,
    pub telemetry: SharedTelemetry,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Command {
    type Input: Sync;
    type Output: Send;

    async fn execute(
        &self,
        input: &Self::Input,
        ctx: &JobContext,
    ) -> Result<CommandOutcome<Self::Output>, Interrupted>;
}

/// Runs `work` at the command boundary.
///
/// Errors are written to the step log, passed to `on_failure` and turned into
/// `HasError`. Cancellation of `ctx.cancel`, or an [`Interrupted`] coming out of
/// `work`, is recorded and returned as `Err(Interrupted)`.
pub async fn guard<T, F, H>(
    ctx: &JobContext,
    work: F,
    on_failure: H,
) -> Result<CommandOutcome<T>, Interrupted>
where
    F: Future<Output = anyhow::Result<CommandOutcome<T>>>,
    H: FnOnce(&anyhow::Error),
{
    let result = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(anyhow::Error::new(Interrupted)),
        result = work => result,
    };

    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => {
            ctx.log.status("Interrupted while waiting for the remote call");
            Err(Interrupted)
        }
        Err(err) => {
            ctx.log.error(&err);
            on_failure(&err);
            Ok(CommandOutcome::has_error())
        }
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::context;
    use super::*;

    #[test]
    fn outcomes_start_unknown_and_only_success_has_payload() {
        assert_eq!(CommandState::default(), CommandState::Unknown);
        assert!(CommandOutcome::<u8>::has_error().payload().is_none());
        assert!(CommandOutcome::<u8>::has_error().state().is_error());
        assert_eq!(CommandOutcome::success(7).into_payload(), Some(7));
    }

    #[tokio::test]
    async fn errors_become_has_error_and_are_logged() {
        let test = context();
        let mut seen = None;
        let outcome = guard(
            &test.ctx,
            async { Err::<CommandOutcome<()>, _>(anyhow::anyhow!("throttled")) },
            |err| seen = Some(err.to_string()),
        )
        .await;

        assert_eq!(outcome.unwrap().state(), CommandState::HasError);
        assert_eq!(seen.as_deref(), Some("throttled"));
        assert!(test.log.text().contains("throttled"));
    }

    #[tokio::test]
    async fn cancellation_is_resignalled() {
        let test = context();
        test.ctx.cancel.cancel();
        let outcome = guard(
            &test.ctx,
            std::future::pending::<anyhow::Result<CommandOutcome<()>>>(),
            |_| panic!("interruption is not a failure"),
        )
        .await;

        assert_eq!(outcome, Err(Interrupted));
        assert!(test.log.text().contains("Interrupted"));
    }

    #[tokio::test]
    async fn interrupted_error_from_work_is_resignalled() {
        let test = context();
        let outcome = guard(
            &test.ctx,
            async { Err::<CommandOutcome<()>, _>(anyhow::Error::new(Interrupted)) },
            |_| panic!("interruption is not a failure"),
        )
        .await;

        assert_eq!(outcome, Err(Interrupted));
    }

    #[test]
    fn console_lines_carry_the_run_id() {
        let log = ConsoleLog::with_writer("job#7", Vec::new());
        log.status("Getting management FQDN");
        log.error(&anyhow::anyhow!("throttled").context("lookup failed"));

        let written = String::from_utf8(log.out.into_inner().unwrap()).unwrap();
        assert_eq!(
            written,
            "[job#7] Getting management FQDN\n[job#7] ERROR: lookup failed: throttled\n"
        );
    }
}
