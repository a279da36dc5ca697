//! Child process execution for storage commands.
//!
//! Runs single commands with output capture, and exporter/importer pairs
//! whose standard streams are connected directly (no shell involved).

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing;

use migrator_core::error::{AppError, ErrorKind};

/// Max stderr characters kept in an error.
const STDERR_LIMIT: usize = 2000;

/// Errors from running a storage command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("'{command}' failed with exit code {code}: {stderr}")]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit code (-1 when killed by a signal).
        code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// The command did not finish within its budget.
    #[error("'{command}' timed out after {seconds} seconds")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// Budget in seconds.
        seconds: u64,
    },

    /// I/O error while streaming between processes.
    #[error("I/O error while running '{command}': {source}")]
    Io {
        /// Rendered command line.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        AppError::with_source(ErrorKind::Replication, err.to_string(), err)
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command spec.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command line for logs and errors.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn spawn(&self, stdin: Stdio, stdout: Stdio) -> Result<Child, CommandError> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

/// Runs storage commands with an optional time budget.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a runner; `None` means commands may run indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run a command to completion and return its standard output.
    pub async fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        tracing::debug!("Running '{}'", spec.render());

        let child = spec.spawn(Stdio::null(), Stdio::piped())?;
        let output = self
            .bounded(spec.render(), async {
                child.wait_with_output().await.map_err(|source| CommandError::Io {
                    command: spec.render(),
                    source,
                })
            })
            .await?;

        if !output.status.success() {
            return Err(failed(spec.render(), output.status.code(), &output.stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Stream the standard output of `exporter` into the standard input of
    /// `importer`. Returns the number of bytes moved.
    ///
    /// Both processes must succeed; the exporter's failure is reported first.
    pub async fn pipe(
        &self,
        exporter: &CommandSpec,
        importer: &CommandSpec,
    ) -> Result<u64, CommandError> {
        let rendered = format!("{} | {}", exporter.render(), importer.render());
        tracing::debug!("Running '{}'", rendered);

        let mut export_child = exporter.spawn(Stdio::null(), Stdio::piped())?;
        let mut import_child = importer.spawn(Stdio::piped(), Stdio::null())?;

        let (Some(mut export_out), Some(mut import_in)) =
            (export_child.stdout.take(), import_child.stdin.take())
        else {
            return Err(CommandError::Io {
                command: rendered,
                source: std::io::Error::other("process streams unavailable"),
            });
        };

        let command = rendered.clone();
        let transfer = async move {
            let copied = tokio::io::copy(&mut export_out, &mut import_in).await;
            // Closing stdin lets the importer see end of stream.
            drop(import_in);
            copied
        };

        let (copied, exported, imported) = self
            .bounded(rendered.clone(), async {
                Ok(tokio::join!(
                    transfer,
                    export_child.wait_with_output(),
                    import_child.wait_with_output()
                ))
            })
            .await?;

        let exported = exported.map_err(|source| CommandError::Io {
            command: exporter.render(),
            source,
        })?;
        if !exported.status.success() {
            return Err(failed(
                exporter.render(),
                exported.status.code(),
                &exported.stderr,
            ));
        }

        let imported = imported.map_err(|source| CommandError::Io {
            command: importer.render(),
            source,
        })?;
        if !imported.status.success() {
            return Err(failed(
                importer.render(),
                imported.status.code(),
                &imported.stderr,
            ));
        }

        copied.map_err(|source| CommandError::Io { command, source })
    }

    async fn bounded<T, F>(&self, command: String, fut: F) -> Result<T, CommandError>
    where
        F: std::future::Future<Output = Result<T, CommandError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| CommandError::Timeout {
                    command,
                    seconds: limit.as_secs(),
                })?,
            None => fut.await,
        }
    }
}

fn failed(command: String, code: Option<i32>, stderr: &[u8]) -> CommandError {
    let stderr = String::from_utf8_lossy(stderr);
    let code = code.unwrap_or(-1);
    tracing::error!(
        "Command failed: '{}', exit_code={}, stderr='{}'",
        command,
        code,
        stderr.chars().take(500).collect::<String>()
    );
    CommandError::Failed {
        command,
        code,
        stderr: stderr.trim().chars().take(STDERR_LIMIT).collect(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = CommandRunner::default();
        let out = runner
            .run(&CommandSpec::new("echo").arg("hello"))
            .await
            .expect("echo should succeed");
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let runner = CommandRunner::default();
        let err = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            CommandError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = CommandRunner::default();
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-binary-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_pipe_counts_bytes() {
        let runner = CommandRunner::default();
        let bytes = runner
            .pipe(
                &CommandSpec::new("printf").arg("hello"),
                &CommandSpec::new("cat"),
            )
            .await
            .expect("pipe should succeed");
        assert_eq!(bytes, 5);
    }

    #[tokio::test]
    async fn test_pipe_exporter_failure() {
        let runner = CommandRunner::default();
        let err = runner
            .pipe(&CommandSpec::new("false"), &CommandSpec::new("cat"))
            .await
            .unwrap_err();
        match err {
            CommandError::Failed { command, .. } => assert_eq!(command, "false"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pipe_importer_failure() {
        let runner = CommandRunner::default();
        let err = runner
            .pipe(
                &CommandSpec::new("printf").arg("x"),
                &CommandSpec::new("sh").args(["-c", "cat >/dev/null; exit 2"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed { code: 2, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = CommandRunner::new(Some(Duration::from_millis(100)));
        let err = runner
            .run(&CommandSpec::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[test]
    fn test_render() {
        let spec = CommandSpec::new("rbd").args(["snap", "ls", "pool/img"]);
        assert_eq!(spec.render(), "rbd snap ls pool/img");
    }
}
