//! External audio codec transforms.
//!
//! Opus encoding and decoding are delegated to `ffmpeg` subprocesses that
//! consume one byte stream and produce another. The session engine only sees
//! the duplex seam defined here: a writer half with explicit end-of-input and
//! a reader half that yields chunks until the transform closes. Process
//! spawning, pipes, and diagnostics stay inside this module.

use crate::defaults::{CHANNELS, SAMPLE_RATE};
use crate::error::{Result, VoxlinkError};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

/// How many bytes to request per read from the transform's output pipe.
const READ_BUF_SIZE: usize = 4096;

/// Writer half of a transform: feed input bytes, then signal end-of-input.
#[async_trait]
pub trait TransformInput: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Closes the transform's input. After this, the output side drains any
    /// remaining data and then reports closed.
    async fn end_input(&mut self) -> Result<()>;
}

/// Reader half of a transform.
#[async_trait]
pub trait TransformOutput: Send {
    /// The next output chunk, in emission order; `None` once the transform
    /// has closed its output. Chunk sizes are arbitrary — whatever pipe
    /// buffering produced.
    async fn read_chunk(&mut self) -> Option<Result<Vec<u8>>>;
}

/// A not-yet-split duplex transform.
pub trait AudioTransform: Send {
    fn split(self: Box<Self>) -> (Box<dyn TransformInput>, Box<dyn TransformOutput>);
}

/// An `ffmpeg` subprocess acting as a byte-stream transform.
pub struct FfmpegTransform {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl FfmpegTransform {
    /// Raw 24kHz mono s16le PCM in, Opus-in-Ogg at 64kbit/s out.
    pub fn opus_encoder() -> Result<Self> {
        let rate = SAMPLE_RATE.to_string();
        let channels = CHANNELS.to_string();
        Self::spawn(
            "encoder",
            &[
                "-hide_banner", "-loglevel", "error",
                "-f", "s16le", "-ar", &rate, "-ac", &channels, "-i", "-",
                "-c:a", "libopus", "-b:a", "64k", "-f", "ogg", "pipe:1",
            ],
        )
    }

    /// Opus-in-Ogg in, raw 24kHz mono s16le PCM out.
    ///
    /// `-re` paces the decode at realtime and `asetpts` normalizes timestamps
    /// so output keeps flowing at playback rate.
    pub fn opus_decoder() -> Result<Self> {
        let rate = SAMPLE_RATE.to_string();
        let channels = CHANNELS.to_string();
        Self::spawn(
            "decoder",
            &[
                "-hide_banner", "-loglevel", "error", "-re",
                "-f", "ogg", "-c:a", "opus", "-i", "-",
                "-filter_complex", "asetpts=N/SR/TB",
                "-f", "s16le", "-ar", &rate, "-ac", &channels, "pipe:1",
            ],
        )
    }

    fn spawn(role: &'static str, args: &[&str]) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoxlinkError::Transform {
                message: format!(
                    "failed to start ffmpeg {}: {}. Is ffmpeg installed?",
                    role, e
                ),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| VoxlinkError::Transform {
            message: format!("ffmpeg {} has no stdin pipe", role),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| VoxlinkError::Transform {
            message: format!("ffmpeg {} has no stdout pipe", role),
        })?;

        // Diagnostic side-channel: forwarded to the log, never parsed,
        // never fatal by itself.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(transform = role, "{}", line);
                }
            });
        }

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }
}

impl AudioTransform for FfmpegTransform {
    fn split(self: Box<Self>) -> (Box<dyn TransformInput>, Box<dyn TransformOutput>) {
        (
            Box::new(FfmpegInput {
                stdin: Some(self.stdin),
            }),
            Box::new(FfmpegOutput {
                stdout: self.stdout,
                // Held so the process is reaped (and killed if still running)
                // when the output half is dropped at teardown.
                _child: self.child,
            }),
        )
    }
}

struct FfmpegInput {
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl TransformInput for FfmpegInput {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VoxlinkError::Transform {
                message: "write after end of input".to_string(),
            });
        };
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| VoxlinkError::Transform {
                message: format!("write to transform failed: {}", e),
            })
    }

    async fn end_input(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.map_err(|e| VoxlinkError::Transform {
                message: format!("failed to close transform input: {}", e),
            })?;
        }
        Ok(())
    }
}

struct FfmpegOutput {
    stdout: ChildStdout,
    _child: Child,
}

#[async_trait]
impl TransformOutput for FfmpegOutput {
    async fn read_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        match self.stdout.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(buf))
            }
            Err(e) => Some(Err(VoxlinkError::Transform {
                message: format!("read from transform failed: {}", e),
            })),
        }
    }
}

/// In-process identity transform for tests: output chunks are exactly the
/// written chunks, and end-of-input closes the output after draining.
pub struct LoopbackTransform {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl LoopbackTransform {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl Default for LoopbackTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTransform for LoopbackTransform {
    fn split(self: Box<Self>) -> (Box<dyn TransformInput>, Box<dyn TransformOutput>) {
        (
            Box::new(LoopbackInput { tx: Some(self.tx) }),
            Box::new(LoopbackOutput { rx: self.rx }),
        )
    }
}

struct LoopbackInput {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl TransformInput for LoopbackInput {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(VoxlinkError::Transform {
                message: "write after end of input".to_string(),
            });
        };
        tx.send(bytes.to_vec())
            .map_err(|_| VoxlinkError::Transform {
                message: "transform output dropped".to_string(),
            })
    }

    async fn end_input(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }
}

struct LoopbackOutput {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl TransformOutput for LoopbackOutput {
    async fn read_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        self.rx.recv().await.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_passes_chunks_in_order() {
        let (mut input, mut output) = Box::new(LoopbackTransform::new()).split();

        input.write(&[1, 2, 3]).await.unwrap();
        input.write(&[4]).await.unwrap();

        assert_eq!(output.read_chunk().await.unwrap().unwrap(), vec![1, 2, 3]);
        assert_eq!(output.read_chunk().await.unwrap().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_loopback_end_input_drains_then_closes() {
        let (mut input, mut output) = Box::new(LoopbackTransform::new()).split();

        input.write(&[9, 9]).await.unwrap();
        input.end_input().await.unwrap();

        // Buffered chunk still comes out, then the stream reports closed
        assert_eq!(output.read_chunk().await.unwrap().unwrap(), vec![9, 9]);
        assert!(output.read_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_loopback_write_after_end_fails() {
        let (mut input, _output) = Box::new(LoopbackTransform::new()).split();
        input.end_input().await.unwrap();
        assert!(input.write(&[0]).await.is_err());
    }

    #[tokio::test]
    async fn test_loopback_end_input_is_idempotent() {
        let (mut input, mut output) = Box::new(LoopbackTransform::new()).split();
        input.end_input().await.unwrap();
        input.end_input().await.unwrap();
        assert!(output.read_chunk().await.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires ffmpeg on PATH
    async fn test_ffmpeg_encoder_produces_ogg_output() {
        let (mut input, mut output) = Box::new(FfmpegTransform::opus_encoder().unwrap()).split();

        // One second of silence
        input.write(&vec![0u8; SAMPLE_RATE as usize * 2]).await.unwrap();
        input.end_input().await.unwrap();

        let chunk = output.read_chunk().await.unwrap().unwrap();
        // Ogg stream marker
        assert_eq!(&chunk[..4], b"OggS");
    }
}
