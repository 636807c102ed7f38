//! Media probing with ffprobe.
//!
//! Runs `ffprobe -print_format json -show_streams <path>` through the host
//! shell and reduces the JSON to the first video stream's descriptor.

use crate::shell::{program_token, ShellDialect};
use crate::startup::{locate_tool, StartupError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tracing::debug;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probing binary is not on the search path. Fatal to a batch.
    #[error("{tool} is not installed or not on PATH")]
    ToolNotInstalled { tool: String },

    /// The tool's output was not the expected JSON document.
    #[error("Failed to parse probe output for {}: {reason}", path.display())]
    ParseFailure { path: PathBuf, reason: String },

    /// The JSON document has no usable `streams` array.
    #[error("Probe output for {} has no streams section", path.display())]
    StreamMissing { path: PathBuf },

    /// The probe process could not be run.
    #[error("Failed to run probe for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// Whether this error must stop the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::ToolNotInstalled { .. })
    }
}

impl From<StartupError> for ProbeError {
    fn from(e: StartupError) -> Self {
        match e {
            StartupError::ToolNotInstalled { tool } => ProbeError::ToolNotInstalled { tool },
        }
    }
}

/// Descriptor of the primary video stream of a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDescriptor {
    /// Codec name (e.g., "hevc", "h264").
    pub codec_name: String,
    /// Codec type ("video", "audio", ...).
    pub codec_type: String,
    /// Duration in seconds, if the tool reported one.
    pub duration_secs: Option<f64>,
    /// File size in bytes from a filesystem stat, -1 if unreadable.
    pub size_bytes: i64,
}

impl StreamDescriptor {
    pub fn is_video(&self) -> bool {
        self.codec_type == "video"
    }
}

/// Anything that can describe a file's primary video stream.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probes one file. `Ok(None)` means the file has no video stream.
    async fn probe(&self, path: &Path) -> Result<Option<StreamDescriptor>, ProbeError>;
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub duration: Option<serde_json::Value>,
        #[serde(default)]
        pub tags: HashMap<String, serde_json::Value>,
    }
}

/// ffprobe-backed prober.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: String,
    dialect: ShellDialect,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            dialect: ShellDialect::host(),
        }
    }

    /// Command line run for `path`.
    pub fn command_line(&self, path: &Path) -> String {
        format!(
            "{} -print_format json -show_streams {}",
            program_token(self.dialect, &self.binary),
            self.dialect.escape_path(path)
        )
    }
}

#[async_trait]
impl MediaProbe for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<Option<StreamDescriptor>, ProbeError> {
        locate_tool(&self.binary)?;

        let line = self.command_line(path);
        debug!(command = %line, "probing");

        let output = self
            .dialect
            .command(&line)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProbeError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            debug!(
                path = %path.display(),
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "probe exited unsuccessfully"
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let descriptor = parse_probe_output(path, &stdout)?;
        Ok(descriptor.map(|mut d| {
            d.size_bytes = crate::enumerate::file_size_or_unknown(path);
            d
        }))
    }
}

/// Parses ffprobe JSON output into the first video stream's descriptor.
///
/// `size_bytes` is left at -1; the caller fills it from a stat.
pub fn parse_probe_output(
    path: &Path,
    json_str: &str,
) -> Result<Option<StreamDescriptor>, ProbeError> {
    let document: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !document.is_object() {
        return Err(ProbeError::ParseFailure {
            path: path.to_path_buf(),
            reason: "top-level value is not an object".to_string(),
        });
    }

    let streams = document
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ProbeError::StreamMissing {
            path: path.to_path_buf(),
        })?;

    let video = streams
        .iter()
        .filter_map(|s| serde_json::from_value::<ffprobe_json::Stream>(s.clone()).ok())
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let Some(stream) = video else {
        return Ok(None);
    };

    let duration_secs = stream
        .duration
        .as_ref()
        .and_then(json_seconds)
        .or_else(|| {
            stream
                .tags
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("duration"))
                .and_then(|(_, v)| v.as_str())
                .and_then(parse_clock)
        });

    Ok(Some(StreamDescriptor {
        codec_name: stream.codec_name.unwrap_or_default(),
        codec_type: stream.codec_type.unwrap_or_default(),
        duration_secs,
        size_bytes: -1,
    }))
}

/// Seconds from a JSON string ("12.5") or number.
fn json_seconds(value: &serde_json::Value) -> Option<f64> {
    let secs = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

/// Seconds from an `H:MM:SS[.fraction]` clock string.
pub(crate) fn parse_clock(s: &str) -> Option<f64> {
    let mut parts = s.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path() -> &'static Path {
        Path::new("/media/movie.mkv")
    }

    #[test]
    fn test_first_video_stream_is_taken() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "audio", "codec_name": "aac", "duration": "10.0"},
                {"index": 1, "codec_type": "video", "codec_name": "h264", "duration": "60.500000"},
                {"index": 2, "codec_type": "video", "codec_name": "mjpeg"}
            ]
        }"#;
        let d = parse_probe_output(path(), json).unwrap().unwrap();
        assert_eq!(d.codec_name, "h264");
        assert_eq!(d.codec_type, "video");
        assert_eq!(d.duration_secs, Some(60.5));
        assert_eq!(d.size_bytes, -1);
        assert!(d.is_video());
    }

    #[test]
    fn test_no_video_stream_is_none() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}]}"#;
        assert_eq!(parse_probe_output(path(), json).unwrap(), None);
    }

    #[test]
    fn test_empty_streams_is_none() {
        assert_eq!(parse_probe_output(path(), r#"{"streams": []}"#).unwrap(), None);
    }

    #[test]
    fn test_missing_streams_section() {
        let err = parse_probe_output(path(), "{}").unwrap_err();
        assert!(matches!(err, ProbeError::StreamMissing { .. }));

        let err = parse_probe_output(path(), r#"{"streams": "nope"}"#).unwrap_err();
        assert!(matches!(err, ProbeError::StreamMissing { .. }));
    }

    #[test]
    fn test_malformed_output() {
        let err = parse_probe_output(path(), "not json at all").unwrap_err();
        assert!(matches!(err, ProbeError::ParseFailure { .. }));

        let err = parse_probe_output(path(), "").unwrap_err();
        assert!(matches!(err, ProbeError::ParseFailure { .. }));

        let err = parse_probe_output(path(), "[1, 2]").unwrap_err();
        assert!(matches!(err, ProbeError::ParseFailure { .. }));
    }

    #[test]
    fn test_duration_falls_back_to_tag() {
        let json = r#"{"streams": [{
            "codec_type": "video", "codec_name": "hevc",
            "tags": {"DURATION": "01:02:03.500000000"}
        }]}"#;
        let d = parse_probe_output(path(), json).unwrap().unwrap();
        assert_eq!(d.duration_secs, Some(3723.5));
    }

    #[test]
    fn test_unparseable_duration_is_none() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "hevc", "duration": "N/A"}]}"#;
        let d = parse_probe_output(path(), json).unwrap().unwrap();
        assert_eq!(d.duration_secs, None);
    }

    #[test]
    fn test_only_tool_missing_is_fatal() {
        let missing = ProbeError::ToolNotInstalled {
            tool: "ffprobe".to_string(),
        };
        let stream = ProbeError::StreamMissing {
            path: PathBuf::from("/a.mkv"),
        };
        assert!(missing.is_fatal());
        assert!(!stream.is_fatal());
    }

    #[test]
    fn test_command_line_shape() {
        let prober = FfprobeProber {
            binary: "ffprobe".to_string(),
            dialect: ShellDialect::Posix,
        };
        assert_eq!(
            prober.command_line(Path::new("/m/a b.mkv")),
            r"ffprobe -print_format json -show_streams /m/a\ b.mkv"
        );
    }

    #[tokio::test]
    async fn test_missing_probe_binary() {
        let prober = FfprobeProber::new("hevcify-no-such-ffprobe");
        let err = prober.probe(path()).await.unwrap_err();
        assert!(matches!(err, ProbeError::ToolNotInstalled { .. }));
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("00:00:00"), Some(0.0));
        assert_eq!(parse_clock("1:00:01.25"), Some(3601.25));
        assert_eq!(parse_clock("00:01"), None);
        assert_eq!(parse_clock("a:b:c"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_non_video_first_stream_never_returned(
            codec_types in proptest::collection::vec(
                prop_oneof![Just("audio"), Just("subtitle"), Just("data"), Just("attachment")],
                0..6,
            ),
        ) {
            let streams: Vec<String> = codec_types
                .iter()
                .map(|t| format!(r#"{{"codec_type": "{}", "codec_name": "x"}}"#, t))
                .collect();
            let json = format!(r#"{{"streams": [{}]}}"#, streams.join(","));
            prop_assert_eq!(parse_probe_output(path(), &json).unwrap(), None);
        }
    }
}
