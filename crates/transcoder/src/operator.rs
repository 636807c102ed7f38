//! Operator answers for relayed overwrite prompts.
//!
//! Input is read line by line on a dedicated thread and queued on a tokio
//! channel. A prompt takes exactly one line off the queue, so lines the
//! operator types for a later prompt wait there until that prompt shows up.
//! The host's standard input gets one reader for the whole process.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

const QUEUED_LINES: usize = 16;

type Lines = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

/// Shared queue of operator lines. Clones read from the same queue.
#[derive(Debug, Clone, Default)]
pub struct OperatorInput {
    source: Source,
}

#[derive(Debug, Clone, Default)]
enum Source {
    /// Started on first use.
    #[default]
    Stdin,
    Reader(Lines),
}

impl OperatorInput {
    /// The host's standard input.
    pub fn stdin() -> Self {
        Self::default()
    }

    /// Lines read from `reader` on a background thread until it ends.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            source: Source::Reader(spawn_line_reader(reader)),
        }
    }

    /// Fixed bytes, handed out line by line then closed.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_reader(io::Cursor::new(bytes.into()))
    }

    /// Waits for the next line, newline included. `None` once the input
    /// has ended and every queued line was taken.
    pub async fn next_line(&self) -> Option<Vec<u8>> {
        let lines = self.lines();
        let mut rx = lines.lock().await;
        rx.recv().await
    }

    fn lines(&self) -> Lines {
        match &self.source {
            Source::Stdin => {
                static STDIN: OnceLock<Lines> = OnceLock::new();
                STDIN.get_or_init(|| spawn_line_reader(io::stdin())).clone()
            }
            Source::Reader(lines) => lines.clone(),
        }
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(reader: R) -> Lines {
    let (tx, rx) = mpsc::channel(QUEUED_LINES);
    let spawned = std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "operator input unreadable");
                        break;
                    }
                }
            }
            debug!("operator input closed");
        });
    // A reader that never started leaves the sender dropped, so the queue
    // reads as already closed.
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start operator input reader");
    }
    Arc::new(Mutex::new(rx))
}
