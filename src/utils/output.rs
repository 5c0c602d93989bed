/// Bounded output collection
/// Each stream is drained on its own thread; bytes past the limit are
/// read and discarded so the child never stalls on a full pipe.
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputIntegrity {
    Complete,
    Truncated,
    /// Stream still open when collection gave up (a descendant kept the pipe)
    Incomplete,
    ReadError,
}

#[derive(Clone, Debug)]
pub struct CapturedOutput {
    pub bytes: Vec<u8>,
    pub integrity: OutputIntegrity,
}

impl CapturedOutput {
    fn empty(integrity: OutputIntegrity) -> Self {
        Self {
            bytes: Vec::new(),
            integrity,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    /// First `lines` lines, for diagnostics in result files
    pub fn head(&self, lines: usize) -> String {
        self.text()
            .lines()
            .take(lines)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Handle to a stream being drained in the background
pub struct StreamCapture {
    rx: Option<Receiver<CapturedOutput>>,
}

impl StreamCapture {
    pub fn spawn<R: Read + Send + 'static>(stream: Option<R>, limit: usize) -> Self {
        let Some(mut stream) = stream else {
            return Self { rx: None };
        };

        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let mut out = Vec::new();
            let mut buf = [0u8; 4096];
            let mut integrity = OutputIntegrity::Complete;

            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let remaining = limit.saturating_sub(out.len());
                        if n > remaining {
                            out.extend_from_slice(&buf[..remaining]);
                            integrity = OutputIntegrity::Truncated;
                        } else {
                            out.extend_from_slice(&buf[..n]);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => {
                        integrity = OutputIntegrity::ReadError;
                        break;
                    }
                }
            }

            let _ = tx.send(CapturedOutput {
                bytes: out,
                integrity,
            });
        });

        Self { rx: Some(rx) }
    }

    /// Wait up to `timeout` for the stream to reach EOF. Never blocks longer.
    pub fn finish(self, timeout: Duration) -> CapturedOutput {
        let Some(rx) = self.rx else {
            return CapturedOutput::empty(OutputIntegrity::Complete);
        };

        match rx.recv_timeout(timeout) {
            Ok(captured) => captured,
            Err(RecvTimeoutError::Timeout) => CapturedOutput::empty(OutputIntegrity::Incomplete),
            Err(RecvTimeoutError::Disconnected) => CapturedOutput::empty(OutputIntegrity::ReadError),
        }
    }
}
