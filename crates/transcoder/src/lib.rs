//! hevcify
//!
//! Batch transcoder: walks a directory, probes each video file and re-encodes
//! the ones not yet in the target codec, one encoder process at a time.

pub mod batch;
pub mod enumerate;
pub mod filter;
pub mod naming;
pub mod operator;
pub mod probe;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod shell;
pub mod startup;
pub mod supervisor;

pub use hevcify_config as config;
pub use hevcify_config::Config;

pub use batch::{run_batch, BatchError, BatchOptions, BatchRunner};
pub use enumerate::{enumerate, EnumerateError, FileEntry};
pub use filter::{Candidate, CandidateFilter, FilterError};
pub use naming::NamingPolicy;
pub use operator::OperatorInput;
pub use probe::{parse_probe_output, FfprobeProber, MediaProbe, ProbeError, StreamDescriptor};
pub use progress::{IndicatifReporter, ProgressReporter, RenderThrottle, SilentReporter};
pub use report::{BatchReport, JobFailure};
pub use scanner::{extract_timestamp, is_overwrite_prompt, ProgressState, PromptDetector};
pub use shell::ShellDialect;
pub use startup::{locate_tool, run_startup_checks, StartupError};
pub use supervisor::{
    JobResult, JobState, OverwritePolicy, Supervisor, SupervisorError, TranscodeRequest,
};
