//! Candidate filter building the transcode work queue.
//!
//! A path becomes a candidate when its suffix is a known video suffix, its
//! probed primary stream is a video stream, and it is not already in the
//! target codec (unless re-encoding was requested).

use crate::config::{Config, TargetCodec};
use crate::probe::{MediaProbe, ProbeError, StreamDescriptor};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for the filter pass. Only fatal probe failures surface here.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{tool} is not installed or not on PATH")]
    ToolNotInstalled { tool: String },
}

/// A queued path with the descriptor that admitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub descriptor: StreamDescriptor,
}

/// Suffix allow-list plus target codec.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    video_extensions: Vec<String>,
    target_codec: TargetCodec,
}

impl CandidateFilter {
    pub fn new(video_extensions: &[String], target_codec: TargetCodec) -> Self {
        Self {
            video_extensions: video_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            target_codec,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.scan.video_extensions, cfg.encode.target_codec)
    }

    /// Checks if a file has a video extension (case-insensitive).
    pub fn has_video_suffix(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.video_extensions.iter().any(|e| *e == ext_lower)
            })
            .unwrap_or(false)
    }

    /// Builds the ordered work queue from `paths`.
    ///
    /// Per-file probe failures are logged and the file dropped; a missing
    /// probing tool aborts the pass.
    pub async fn filter<I, P>(
        &self,
        prober: &dyn MediaProbe,
        paths: I,
        re_encode: bool,
    ) -> Result<Vec<PathBuf>, FilterError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let candidates = self.select(prober, paths, re_encode).await?;
        Ok(candidates.into_iter().map(|c| c.path).collect())
    }

    /// Same as [`filter`](Self::filter), keeping each probe descriptor.
    pub async fn select<I, P>(
        &self,
        prober: &dyn MediaProbe,
        paths: I,
        re_encode: bool,
    ) -> Result<Vec<Candidate>, FilterError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut queue = Vec::new();

        for path in paths {
            let path = path.as_ref();
            if !self.has_video_suffix(path) {
                continue;
            }

            let descriptor = match prober.probe(path).await {
                Ok(Some(d)) => d,
                Ok(None) => {
                    debug!(path = %path.display(), "no video stream, skipping");
                    continue;
                }
                Err(ProbeError::ToolNotInstalled { tool }) => {
                    return Err(FilterError::ToolNotInstalled { tool });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "probe failed, skipping");
                    continue;
                }
            };

            if !descriptor.is_video() {
                debug!(path = %path.display(), codec_type = %descriptor.codec_type, "not a video stream, skipping");
                continue;
            }

            if !re_encode && descriptor.codec_name == self.target_codec.name() {
                debug!(path = %path.display(), codec = %descriptor.codec_name, "already in target codec, skipping");
                continue;
            }

            queue.push(Candidate {
                path: path.to_path_buf(),
                descriptor,
            });
        }

        Ok(queue)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::probe::StreamDescriptor;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted probe results keyed by file name.
    pub(crate) struct FakeProbe {
        results: HashMap<String, FakeOutcome>,
        pub(crate) calls: Mutex<Vec<PathBuf>>,
    }

    #[derive(Clone)]
    pub(crate) enum FakeOutcome {
        Stream { codec_name: &'static str, codec_type: &'static str },
        NoVideo,
        Broken,
        Missing,
    }

    impl FakeProbe {
        pub(crate) fn new(entries: &[(&str, FakeOutcome)]) -> Self {
            Self {
                results: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaProbe for FakeProbe {
        async fn probe(&self, path: &Path) -> Result<Option<StreamDescriptor>, ProbeError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            match self.results.get(&name) {
                Some(FakeOutcome::Stream { codec_name, codec_type }) => Ok(Some(StreamDescriptor {
                    codec_name: codec_name.to_string(),
                    codec_type: codec_type.to_string(),
                    duration_secs: Some(60.0),
                    size_bytes: 1024,
                })),
                Some(FakeOutcome::NoVideo) | None => Ok(None),
                Some(FakeOutcome::Broken) => Err(ProbeError::ParseFailure {
                    path: path.to_path_buf(),
                    reason: "garbage".to_string(),
                }),
                Some(FakeOutcome::Missing) => Err(ProbeError::ToolNotInstalled {
                    tool: "ffprobe".to_string(),
                }),
            }
        }
    }

    fn filter() -> CandidateFilter {
        CandidateFilter::from_config(&Config::default())
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/media").join(n)).collect()
    }

    fn scenario_probe() -> FakeProbe {
        FakeProbe::new(&[
            ("a.mp4", FakeOutcome::Stream { codec_name: "hevc", codec_type: "video" }),
            ("b.mkv", FakeOutcome::Stream { codec_name: "h264", codec_type: "video" }),
        ])
    }

    #[tokio::test]
    async fn test_scenario_without_re_encode() {
        let probe = scenario_probe();
        let queue = filter()
            .filter(&probe, paths(&["a.mp4", "b.mkv", "note.txt"]), false)
            .await
            .unwrap();
        assert_eq!(queue, paths(&["b.mkv"]));
        // note.txt never reaches the prober
        assert_eq!(probe.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_with_re_encode() {
        let probe = scenario_probe();
        let queue = filter()
            .filter(&probe, paths(&["a.mp4", "b.mkv", "note.txt"]), true)
            .await
            .unwrap();
        assert_eq!(queue, paths(&["a.mp4", "b.mkv"]));
    }

    #[tokio::test]
    async fn test_select_keeps_descriptor() {
        let probe = scenario_probe();
        let selected = filter()
            .select(&probe, paths(&["a.mp4", "b.mkv"]), false)
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].descriptor.codec_name, "h264");
        assert_eq!(selected[0].descriptor.duration_secs, Some(60.0));
    }

    #[tokio::test]
    async fn test_per_file_failure_is_skipped() {
        let probe = FakeProbe::new(&[
            ("bad.mkv", FakeOutcome::Broken),
            ("audio.mp4", FakeOutcome::NoVideo),
            ("good.mkv", FakeOutcome::Stream { codec_name: "vp9", codec_type: "video" }),
        ]);
        let queue = filter()
            .filter(&probe, paths(&["bad.mkv", "audio.mp4", "good.mkv"]), false)
            .await
            .unwrap();
        assert_eq!(queue, paths(&["good.mkv"]));
    }

    #[tokio::test]
    async fn test_missing_tool_aborts_immediately() {
        let probe = FakeProbe::new(&[("a.mkv", FakeOutcome::Missing)]);
        let result = filter()
            .filter(&probe, paths(&["a.mkv", "b.mkv", "c.mkv"]), false)
            .await;
        assert!(matches!(result, Err(FilterError::ToolNotInstalled { .. })));
        assert_eq!(probe.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_has_video_suffix() {
        let f = filter();
        assert!(f.has_video_suffix(Path::new("/media/movie.mkv")));
        assert!(f.has_video_suffix(Path::new("/media/movie.MKV")));
        assert!(f.has_video_suffix(Path::new("/media/movie.Mp4")));
        assert!(f.has_video_suffix(Path::new("/media/movie.flv")));
        assert!(!f.has_video_suffix(Path::new("/media/movie.txt")));
        assert!(!f.has_video_suffix(Path::new("/media/movie")));
        assert!(!f.has_video_suffix(Path::new("/media/.mkv")));
    }

    #[test]
    fn test_configured_extensions_accept_leading_dot() {
        let f = CandidateFilter::new(&[".MKV".to_string()], TargetCodec::Hevc);
        assert!(f.has_video_suffix(Path::new("x.mkv")));
        assert!(!f.has_video_suffix(Path::new("x.mp4")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_filter_never_admits_non_video_or_target_codec(
            files in proptest::collection::vec(
                (
                    prop_oneof![Just("hevc"), Just("h264"), Just("vp9"), Just("mpeg4")],
                    prop_oneof![Just("video"), Just("audio"), Just("subtitle")],
                ),
                0..10,
            ),
            re_encode in proptest::bool::ANY,
        ) {
            let names: Vec<String> = (0..files.len()).map(|i| format!("f{}.mkv", i)).collect();
            let entries: Vec<(&str, FakeOutcome)> = names
                .iter()
                .zip(files.iter())
                .map(|(n, (codec, kind))| {
                    (n.as_str(), FakeOutcome::Stream { codec_name: *codec, codec_type: *kind })
                })
                .collect();
            let probe = FakeProbe::new(&entries);
            let inputs: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let queue = rt
                .block_on(filter().filter(&probe, inputs, re_encode))
                .unwrap();

            for (name, (codec, kind)) in names.iter().zip(files.iter()) {
                let admitted = queue.contains(&PathBuf::from(name));
                let expected = *kind == "video" && (re_encode || *codec != "hevc");
                prop_assert_eq!(admitted, expected, "{} ({}, {})", name, codec, kind);
            }
        }
    }
}
