//! Transcode supervisor.
//!
//! Runs one encoder process per request through the host shell, reads its
//! combined output chunk by chunk, answers overwrite prompts according to
//! the request's [`OverwritePolicy`] and turns `time=` markers into progress.
//!
//! Raw reads are used instead of line reads: the overwrite prompt is printed
//! without a trailing newline and the encoder then blocks on stdin.

use crate::config::{Config, TargetCodec};
use crate::enumerate::file_size_or_unknown;
use crate::operator::OperatorInput;
use crate::progress::{ProgressReporter, RenderThrottle};
use crate::scanner::{extract_timestamp, ProgressState, PromptDetector};
use crate::shell::{program_token, ShellDialect};
use crate::startup::locate_tool;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 8192;

/// Error type for supervising one job.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The encoder could not be started. Halts the batch.
    #[error("Failed to start {program}: {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading the encoder's output or reaping it failed.
    #[error("Failed reading encoder output for {}: {source}", path.display())]
    OutputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The encoder reported success but left no bytes at the destination.
    #[error("Encoder produced an empty output at {}", destination.display())]
    EmptyOutput { destination: PathBuf },

    /// The request cannot be run as given.
    #[error("Invalid transcode request: {reason}")]
    InvalidRequest { reason: String },
}

impl SupervisorError {
    /// Whether this error must stop the remaining queue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorError::SpawnFailure { .. })
    }
}

/// How an encoder overwrite prompt gets answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Answer `y`.
    AlwaysYes,
    /// Answer `N`.
    AlwaysNo,
    /// Show the prompt and relay the operator's answer.
    #[default]
    AskInteractively,
    /// Show the encoder's raw prompt text and relay the operator's answer.
    PassThroughToChild,
}

impl OverwritePolicy {
    /// Maps the command-line flags; `yes` and `no` are mutually exclusive.
    pub fn from_flags(yes: bool, no: bool, pass_through: bool) -> Self {
        match (yes, no, pass_through) {
            (true, _, _) => OverwritePolicy::AlwaysYes,
            (_, true, _) => OverwritePolicy::AlwaysNo,
            (_, _, true) => OverwritePolicy::PassThroughToChild,
            _ => OverwritePolicy::AskInteractively,
        }
    }

    /// Bytes written to the encoder without operator involvement.
    pub fn canned_answer(&self) -> Option<&'static [u8]> {
        match self {
            OverwritePolicy::AlwaysYes => Some(b"y\n"),
            OverwritePolicy::AlwaysNo => Some(b"N\n"),
            OverwritePolicy::AskInteractively | OverwritePolicy::PassThroughToChild => None,
        }
    }
}

/// One queued file to transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    source: PathBuf,
    destination: PathBuf,
    target_codec: TargetCodec,
    crf: u8,
    policy: OverwritePolicy,
    duration_secs: Option<f64>,
}

impl TranscodeRequest {
    /// Rejects an empty destination.
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        target_codec: TargetCodec,
        crf: u8,
        policy: OverwritePolicy,
    ) -> Result<Self, SupervisorError> {
        let destination = destination.into();
        if destination.as_os_str().is_empty() {
            return Err(SupervisorError::InvalidRequest {
                reason: "destination path is empty".to_string(),
            });
        }
        Ok(Self {
            source: source.into(),
            destination,
            target_codec,
            crf,
            policy,
            duration_secs: None,
        })
    }

    /// Source duration used to size the progress bar.
    pub fn with_duration(mut self, duration_secs: Option<f64>) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn target_codec(&self) -> TargetCodec {
        self.target_codec
    }

    pub fn crf(&self) -> u8 {
        self.crf
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Launching,
    Streaming,
    AwaitingOverwriteAnswer,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Launching => "launching",
            JobState::Streaming => "streaming",
            JobState::AwaitingOverwriteAnswer => "awaiting_overwrite_answer",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one finished encoder run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Output reached end-of-stream and the encoder exited with status 0.
    pub success: bool,
    pub final_state: JobState,
    /// `None` when the encoder was killed by a signal.
    pub exit_code: Option<i32>,
    /// Bytes, -1 if unreadable.
    pub source_size: i64,
    /// Bytes, -1 if missing.
    pub destination_size: i64,
    pub duration: Duration,
    pub final_elapsed_secs: f64,
    pub prompts_seen: u32,
}

/// Runs encoder jobs one at a time. Clones share one operator input.
#[derive(Debug, Clone)]
pub struct Supervisor {
    encode_binary: String,
    dialect: ShellDialect,
    safety_margin_secs: f64,
    render_interval: Duration,
    operator: OperatorInput,
}

impl Supervisor {
    pub fn new(encode_binary: impl Into<String>) -> Self {
        Self {
            encode_binary: encode_binary.into(),
            dialect: ShellDialect::host(),
            safety_margin_secs: 1.0,
            render_interval: Duration::from_millis(200),
            operator: OperatorInput::stdin(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            safety_margin_secs: cfg.progress.safety_margin_secs,
            render_interval: Duration::from_millis(cfg.progress.render_interval_ms),
            ..Self::new(cfg.tools.encode_binary.clone())
        }
    }

    pub fn with_operator_input(mut self, operator: OperatorInput) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    /// Shell command line for `request`. `-y` is never passed so that the
    /// encoder asks before overwriting.
    pub fn command_line(&self, request: &TranscodeRequest) -> String {
        format!(
            "{} -i {} -c:v {} -crf {} {} 2>&1",
            program_token(self.dialect, &self.encode_binary),
            self.dialect.escape_path(&request.source),
            request.target_codec.encoder_library(),
            request.crf,
            self.dialect.escape_path(&request.destination)
        )
    }

    /// Runs one request to completion.
    ///
    /// A non-zero exit yields `Ok` with `success == false`; a zero exit with
    /// no destination bytes yields [`SupervisorError::EmptyOutput`].
    pub async fn run(
        &self,
        request: &TranscodeRequest,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<JobResult, SupervisorError> {
        let started = Instant::now();
        let mut state = JobState::Pending;
        let source_size = file_size_or_unknown(&request.source);

        transition(&mut state, JobState::Launching, request);
        locate_tool(&self.encode_binary).map_err(|e| SupervisorError::SpawnFailure {
            program: self.encode_binary.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })?;

        let line = self.command_line(request);
        debug!(command = %line, "launching encoder");

        let mut child = self
            .dialect
            .command(&line)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailure {
                program: self.encode_binary.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::SpawnFailure {
                program: self.encode_binary.clone(),
                source: io::Error::other("encoder stdout was not captured"),
            })?;
        let mut stdin: Option<ChildStdin> = child.stdin.take();
        let mut prompts = PromptDetector::new();

        let mut progress = ProgressState::new(request.duration_secs, self.safety_margin_secs);
        let mut throttle = RenderThrottle::new(self.render_interval);
        let mut prompts_seen = 0u32;
        let mut buf = vec![0u8; READ_CHUNK_BYTES];

        transition(&mut state, JobState::Streaming, request);
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(source) => {
                    transition(&mut state, JobState::Failed, request);
                    reporter.finish();
                    return Err(SupervisorError::OutputRead {
                        path: request.source.clone(),
                        source,
                    });
                }
            };
            let chunk = String::from_utf8_lossy(&buf[..n]);

            if prompts.feed(&chunk) {
                prompts_seen += 1;
                transition(&mut state, JobState::AwaitingOverwriteAnswer, request);
                self.answer_prompt(request, &chunk, &mut stdin, reporter).await;
                transition(&mut state, JobState::Streaming, request);
            }

            if let Some(total) = progress.total_secs() {
                if let Some(elapsed) = extract_timestamp(&chunk).and_then(|t| progress.advance(t)) {
                    throttle.offer(reporter, elapsed, total, Instant::now());
                }
            }
        }

        throttle.flush(reporter);
        reporter.finish();
        drop(stdin);

        let status = child.wait().await.map_err(|source| SupervisorError::OutputRead {
            path: request.source.clone(),
            source,
        })?;

        let destination_size = file_size_or_unknown(&request.destination);
        let success = status.success();

        if success && destination_size <= 0 {
            transition(&mut state, JobState::Failed, request);
            return Err(SupervisorError::EmptyOutput {
                destination: request.destination.clone(),
            });
        }

        let final_state = if success {
            JobState::Completed
        } else {
            JobState::Failed
        };
        transition(&mut state, final_state, request);

        let result = JobResult {
            source: request.source.clone(),
            destination: request.destination.clone(),
            success,
            final_state,
            exit_code: status.code(),
            source_size,
            destination_size,
            duration: started.elapsed(),
            final_elapsed_secs: progress.elapsed_secs(),
            prompts_seen,
        };

        if success {
            info!(
                source = %request.source.display(),
                destination = %request.destination.display(),
                secs = result.duration.as_secs_f64(),
                "encode finished"
            );
        } else {
            warn!(
                source = %request.source.display(),
                exit_code = ?result.exit_code,
                "encoder exited unsuccessfully"
            );
        }

        Ok(result)
    }

    /// Answers one prompt. Canned policies write their answer; the others
    /// show the prompt and forward exactly one operator line, closing the
    /// encoder's stdin once operator input has ended.
    async fn answer_prompt(
        &self,
        request: &TranscodeRequest,
        chunk: &str,
        stdin: &mut Option<ChildStdin>,
        reporter: &mut dyn ProgressReporter,
    ) {
        let policy = request.policy;
        let Some(pipe) = stdin.as_mut() else {
            warn!(destination = %request.destination.display(), "encoder stdin already closed, prompt left unanswered");
            return;
        };

        if let Some(answer) = policy.canned_answer() {
            info!(
                destination = %request.destination.display(),
                answer = %String::from_utf8_lossy(answer).trim(),
                "answering overwrite prompt"
            );
            if let Err(e) = write_answer(pipe, answer).await {
                warn!(error = %e, "failed to answer overwrite prompt");
            }
            return;
        }

        match policy {
            OverwritePolicy::PassThroughToChild => reporter.print_above(chunk),
            _ => reporter.print_above(&format!(
                "\n{} already exists. Overwrite? [y/N] ",
                request.destination.display()
            )),
        }

        match self.operator.next_line().await {
            Some(line) => {
                debug!(bytes = line.len(), "forwarding operator answer");
                if let Err(e) = write_answer(pipe, &line).await {
                    warn!(error = %e, "failed to forward operator answer");
                }
            }
            None => {
                debug!("operator input closed, closing encoder stdin");
                *stdin = None;
            }
        }
    }
}

async fn write_answer(pipe: &mut ChildStdin, answer: &[u8]) -> io::Result<()> {
    pipe.write_all(answer).await?;
    pipe.flush().await
}

fn transition(state: &mut JobState, next: JobState, request: &TranscodeRequest) {
    debug!(
        source = %request.source.display(),
        from = %state,
        to = %next,
        "job state"
    );
    *state = next;
}
