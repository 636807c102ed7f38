//! Batch driver for hevcify
//!
//! Enumerates a directory, filters it down to a work queue and runs the
//! queue through the supervisor strictly one file at a time.

use crate::config::Config;
use crate::enumerate::{enumerate, EnumerateError};
use crate::filter::{CandidateFilter, FilterError};
use crate::naming::NamingPolicy;
use crate::probe::{FfprobeProber, MediaProbe};
use crate::progress::{IndicatifReporter, ProgressReporter, SilentReporter};
use crate::report::{summary_line, BatchReport, JobFailure};
use crate::startup::{run_startup_checks, StartupError};
use crate::supervisor::{OverwritePolicy, Supervisor, SupervisorError, TranscodeRequest};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

/// Error type for batch runs. Every variant stops the remaining queue.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A required tool is missing.
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// The root could not be listed.
    #[error("Enumeration failed: {0}")]
    Enumerate(#[from] EnumerateError),

    /// The probing tool vanished during filtering.
    #[error("Filtering failed: {0}")]
    Filter(#[from] FilterError),

    /// The encoder could not be started.
    #[error("Transcode failed: {0}")]
    Supervisor(#[from] SupervisorError),
}

/// What to transcode and how.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub root: PathBuf,
    pub recursive: bool,
    /// Also re-encode files already in the target codec.
    pub re_encode: bool,
    /// Overrides the configured CRF.
    pub crf: Option<u8>,
    pub policy: OverwritePolicy,
    pub suffix_override: Option<String>,
    /// Overrides the configured container forcing when set.
    pub force_mp4: bool,
}

impl BatchOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            re_encode: false,
            crf: None,
            policy: OverwritePolicy::default(),
            suffix_override: None,
            force_mp4: false,
        }
    }
}

/// Owns the collaborators of a batch run.
pub struct BatchRunner {
    config: Config,
    prober: Box<dyn MediaProbe>,
    supervisor: Supervisor,
    show_progress: bool,
}

impl BatchRunner {
    /// Builds a runner after checking that both tools are installed.
    pub fn new(config: Config) -> Result<Self, BatchError> {
        run_startup_checks(&config)?;
        Ok(Self::new_without_checks(config))
    }

    /// Builds a runner with the ffprobe/ffmpeg collaborators and no tool checks.
    pub fn new_without_checks(config: Config) -> Self {
        let prober = Box::new(FfprobeProber::new(config.tools.probe_binary.clone()));
        let supervisor = Supervisor::from_config(&config);
        Self::with_parts(config, prober, supervisor)
    }

    /// Builds a runner around caller-supplied collaborators.
    pub fn with_parts(config: Config, prober: Box<dyn MediaProbe>, supervisor: Supervisor) -> Self {
        Self {
            config,
            prober,
            supervisor,
            show_progress: true,
        }
    }

    /// Disables progress bars.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one batch.
    ///
    /// Per-file failures are recorded in the report; a missing tool or an
    /// encoder that cannot be started aborts the remaining queue. A job
    /// already running is never interrupted.
    pub async fn run(&self, opts: &BatchOptions) -> Result<BatchReport, BatchError> {
        let mut report = BatchReport::default();

        let mut paths: Vec<PathBuf> = enumerate(&opts.root, opts.recursive)?
            .into_iter()
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();
        report.scanned = paths.len();

        let filter = CandidateFilter::from_config(&self.config);
        let candidates = match filter.select(self.prober.as_ref(), &paths, opts.re_encode).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "aborting batch");
                return Err(e.into());
            }
        };
        report.queued = candidates.len();
        info!(
            root = %opts.root.display(),
            scanned = report.scanned,
            queued = report.queued,
            "work queue built"
        );

        let mut naming = NamingPolicy::from_config(&self.config, opts.suffix_override.clone());
        naming.force_mp4 |= opts.force_mp4;
        let crf = opts.crf.unwrap_or(self.config.encode.crf);
        let total = candidates.len();

        for (i, candidate) in candidates.into_iter().enumerate() {
            let destination = naming.destination_for(&candidate.path);
            if destination == candidate.path {
                warn!(path = %candidate.path.display(), "destination equals source, skipping");
                report.failures.push(JobFailure {
                    source: candidate.path,
                    reason: "destination equals source".to_string(),
                });
                continue;
            }

            let request = match TranscodeRequest::new(
                &candidate.path,
                destination,
                self.config.encode.target_codec,
                crf,
                opts.policy,
            ) {
                Ok(r) => r.with_duration(candidate.descriptor.duration_secs),
                Err(e) => {
                    warn!(path = %candidate.path.display(), error = %e, "skipping");
                    report.failures.push(JobFailure {
                        source: candidate.path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            info!(
                index = i + 1,
                total,
                source = %request.source().display(),
                destination = %request.destination().display(),
                "transcoding"
            );

            let mut reporter = self.reporter_for(&request);
            match self.supervisor.run(&request, reporter.as_mut()).await {
                Ok(result) => {
                    info!("{}", summary_line(i + 1, total, &result));
                    report.results.push(result);
                }
                Err(e) if e.is_fatal() => {
                    error!(path = %candidate.path.display(), error = %e, "aborting batch");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(path = %candidate.path.display(), error = %e, "job failed");
                    report.failures.push(JobFailure {
                        source: candidate.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    fn reporter_for(&self, request: &TranscodeRequest) -> Box<dyn ProgressReporter> {
        if !self.show_progress {
            return Box::new(SilentReporter);
        }
        let label = request
            .source()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Box::new(IndicatifReporter::new(label))
    }
}

/// Checks tools and runs one batch with the real collaborators.
pub async fn run_batch(config: Config, opts: &BatchOptions) -> Result<BatchReport, BatchError> {
    BatchRunner::new(config)?.run(opts).await
}
