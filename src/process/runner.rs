//! tokio-backed process runner

use crate::process::{Invocation, OutputSink, ProcessError, ProcessOutput, ProcessRunner, StreamKind};
use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Chunks buffered between the reader and the gzip writer
const CHUNK_QUEUE: usize = 16;

/// Runs invocations as child processes of this one.
///
/// stdout and stderr are each drained by their own spawned task; the
/// invocation completes once both tasks reached end-of-stream and the exit
/// status was collected. No timeout is applied.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn spawn(invocation: &Invocation) -> Result<Child, ProcessError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        // argv may carry a credential for remote dumps, so only the program is logged
        debug!("Spawning {} with {} arguments", invocation.program, invocation.args.len());
        cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: invocation.program.clone(),
            source,
        })
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Arc<dyn OutputSink>,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut child = Self::spawn(invocation)?;
        let program = invocation.program.as_str();

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(program, "stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe(program, "stderr"))?;

        let stdout_task = drain_lines(stdout, StreamKind::Stdout, sink.clone());
        let stderr_task = drain_lines(stderr, StreamKind::Stderr, sink);

        let (stdout_lines, stderr_lines) = tokio::join!(stdout_task, stderr_task);
        let stdout_lines = settle(program, stdout_lines)?;
        let stderr_lines = settle(program, stderr_lines)?;

        let status = child.wait().await.map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        })?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout: stdout_lines,
            stderr: stderr_lines,
        })
    }

    async fn run_to_file(
        &self,
        invocation: &Invocation,
        destination: &Path,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = invocation.program.as_str();
        let mut child = Self::spawn(invocation)?;
        let file = match File::create(destination) {
            Ok(file) => file,
            Err(source) => {
                if let Err(e) = child.kill().await {
                    debug!("Failed to stop {}: {}", program, e);
                }
                return Err(ProcessError::Io {
                    program: program.to_string(),
                    source,
                });
            }
        };
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(program, "stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe(program, "stderr"))?;

        let stdout_task = drain_gzip(stdout, file);
        let stderr_task = drain_lines(stderr, StreamKind::Stderr, Arc::new(super::NoopSink));

        let (written, stderr_lines) = tokio::join!(stdout_task, stderr_task);
        let written = settle(program, written)?;
        let stderr_lines = settle(program, stderr_lines)?;

        let status = child.wait().await.map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        })?;
        debug!(
            "{} wrote {} uncompressed bytes to {}",
            program,
            written,
            destination.display()
        );

        Ok(ProcessOutput {
            code: status.code(),
            stdout: Vec::new(),
            stderr: stderr_lines,
        })
    }
}

/// Read a stream line by line until EOF, forwarding each line to the sink
fn drain_lines<R>(
    reader: R,
    stream: StreamKind,
    sink: Arc<dyn OutputSink>,
) -> JoinHandle<std::io::Result<Vec<String>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut lines = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            sink.on_line(stream, &line);
            lines.push(line);
        }
        Ok(lines)
    })
}

/// Copy a stream into a gzip-compressed file until EOF.
///
/// Compression and file writes run on the blocking pool, fed through a
/// bounded channel. If the writer fails the stream is still drained so the
/// child never blocks on a full pipe.
fn drain_gzip<R>(mut reader: R, file: File) -> JoinHandle<std::io::Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CHUNK_QUEUE);
    let writer = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
        let mut encoder = GzEncoder::new(file, Compression::default());
        let mut total = 0u64;
        while let Some(chunk) = rx.blocking_recv() {
            encoder.write_all(&chunk)?;
            total += chunk.len() as u64;
        }
        encoder.finish()?.sync_all()?;
        Ok(total)
    });

    tokio::spawn(async move {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut writer_open = true;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if writer_open && tx.send(buf[..n].to_vec()).await.is_err() {
                writer_open = false;
            }
        }
        drop(tx);
        writer.await.map_err(std::io::Error::other)?
    })
}

fn settle<T>(
    program: &str,
    joined: Result<std::io::Result<T>, tokio::task::JoinError>,
) -> Result<T, ProcessError> {
    joined
        .map_err(std::io::Error::other)
        .and_then(|inner| inner)
        .map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        })
}

fn missing_pipe(program: &str, stream: &str) -> ProcessError {
    ProcessError::Io {
        program: program.to_string(),
        source: std::io::Error::other(format!("{} was not captured", stream)),
    }
}
