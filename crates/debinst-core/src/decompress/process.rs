//! External-process backend: `ar p` and `xz -d -c`.
//!
//! A child's stdout is exposed as a [`Read`] stream. When the child needs
//! input, a producer thread pumps it into the child's stdin through a fixed
//! [`CopyBuffer`]; the OS pipe provides backpressure. Once stdout reaches
//! EOF the child is reaped with a bounded wait, and a non-zero exit is
//! turned into a tagged read error. Dropping the stream early kills the
//! child and joins the helper threads.

use std::io::Read;
use std::io::{self};
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStdout;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::warn;

use super::ByteStream;
use super::Decompressor;
use crate::InstallError;
use crate::Result;
use crate::config::ToolConfig;
use crate::copy::CopyBuffer;
use crate::copy::pump;
use crate::error::StreamFault;

const STDERR_CAPTURE_LIMIT: u64 = 4096;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// `xz -d -c` as a [`Decompressor`].
#[derive(Debug, Clone)]
pub struct ExternalXz {
    program: PathBuf,
    exit_timeout: Duration,
}

impl ExternalXz {
    /// Resolves the `xz` binary.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable { tool: "xz" }` if it cannot be found.
    pub fn new(tools: &ToolConfig) -> Result<Self> {
        Ok(Self {
            program: resolve_tool("xz", tools.xz.as_deref())?,
            exit_timeout: tools.exit_timeout,
        })
    }
}

impl Decompressor for ExternalXz {
    fn name(&self) -> &'static str {
        "external-xz"
    }

    fn decompress(&self, input: ByteStream) -> Result<ByteStream> {
        let mut command = Command::new(&self.program);
        command.args(["-d", "-c"]);
        let reader = ProcessReader::spawn("xz", command, Some(input), self.exit_timeout, Role::Decoder)?;
        Ok(Box::new(reader))
    }
}

/// Streams one member of an ar container through `ar p`.
///
/// # Errors
///
/// Returns `BackendUnavailable { tool: "ar" }` if `ar` cannot be found or
/// started. A missing member or unreadable container is reported while
/// reading the stream.
pub fn system_ar_member(tools: &ToolConfig, archive: &Path, member: &str) -> Result<ByteStream> {
    let program = resolve_tool("ar", tools.ar.as_deref())?;
    let mut command = Command::new(program);
    command.arg("p").arg(archive).arg(member);
    let reader = ProcessReader::spawn(
        "ar",
        command,
        None,
        tools.exit_timeout,
        Role::ArMember(member.to_string()),
    )?;
    Ok(Box::new(reader))
}

fn resolve_tool(tool: &'static str, configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(InstallError::BackendUnavailable {
            tool,
            reason: format!("{} is not a file", path.display()),
        }),
        None => which::which(tool).map_err(|e| InstallError::BackendUnavailable {
            tool,
            reason: format!("not found in PATH: {e}"),
        }),
    }
}

/// What a non-zero exit means for the caller.
#[derive(Debug, Clone)]
enum Role {
    Decoder,
    ArMember(String),
}

impl Role {
    fn exit_fault(&self, tool: &str, status: ExitStatus, stderr: &str) -> StreamFault {
        let detail = format!("{tool} exited with {status}: {}", stderr.trim());
        match self {
            Self::Decoder => StreamFault::Corrupt(detail),
            Self::ArMember(member) if stderr.contains("no entry") => {
                StreamFault::MissingMember(member.clone())
            }
            Self::ArMember(_) => StreamFault::Archive(detail),
        }
    }
}

/// A running child process read through its stdout.
pub(crate) struct ProcessReader {
    tool: &'static str,
    role: Role,
    child: Child,
    stdout: Option<ChildStdout>,
    producer: Option<JoinHandle<io::Result<u64>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    exit_timeout: Duration,
    finished: bool,
}

impl ProcessReader {
    fn spawn(
        tool: &'static str,
        mut command: Command,
        input: Option<ByteStream>,
        exit_timeout: Duration,
        role: Role,
    ) -> Result<Self> {
        command
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| InstallError::BackendUnavailable {
            tool,
            reason: format!("failed to start: {e}"),
        })?;
        debug!(tool, pid = child.id(), "spawned external tool");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut captured = Vec::new();
                let _ = (&mut pipe).take(STDERR_CAPTURE_LIMIT).read_to_end(&mut captured);
                let _ = io::copy(&mut pipe, &mut io::sink());
                captured
            })
        });

        let producer = match (input, child.stdin.take()) {
            (Some(mut input), Some(mut stdin)) => {
                let spawned = std::thread::Builder::new()
                    .name(format!("{tool}-stdin"))
                    .spawn(move || {
                        let mut buffer = CopyBuffer::new();
                        let result = pump(&mut input, &mut stdin, &mut buffer);
                        drop(stdin);
                        result
                    });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(InstallError::Io(e));
                    }
                }
            }
            _ => None,
        };

        Ok(Self {
            tool,
            role,
            child,
            stdout,
            producer,
            stderr,
            exit_timeout,
            finished: false,
        })
    }

    /// Reaps the child after stdout EOF and reports the outcome.
    fn finish(&mut self) -> io::Result<()> {
        self.stdout = None;
        let status = self.wait_with_timeout()?;

        let produced = self.producer.take().map(|handle| {
            handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin producer panicked")))
        });
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        // An upstream failure explains a downstream one; report it first.
        if let Some(Err(e)) = produced
            && e.kind() != io::ErrorKind::BrokenPipe
        {
            return Err(e);
        }

        if !status.success() {
            warn!(tool = self.tool, %status, stderr = %stderr.trim(), "external tool failed");
            return Err(self.role.exit_fault(self.tool, status, &stderr).into_io());
        }

        // Some `ar` builds exit 0 after reporting a missing member.
        if let Role::ArMember(member) = &self.role
            && stderr.contains("no entry")
        {
            return Err(StreamFault::MissingMember(member.clone()).into_io());
        }

        debug!(tool = self.tool, "external tool finished");
        Ok(())
    }

    fn wait_with_timeout(&mut self) -> io::Result<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() > self.exit_timeout {
                warn!(tool = self.tool, timeout = ?self.exit_timeout, "killing unresponsive tool");
                let _ = self.child.kill();
                let _ = self.child.wait();
                return Err(StreamFault::Corrupt(format!(
                    "{} did not exit within {:?}",
                    self.tool, self.exit_timeout
                ))
                .into_io());
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl Read for ProcessReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(0);
        };

        let n = stdout.read(buf)?;
        if n > 0 {
            return Ok(n);
        }

        self.finished = true;
        self.finish()?;
        Ok(0)
    }
}

impl Drop for ProcessReader {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.stdout = None;
        if self.child.try_wait().ok().flatten().is_none() {
            debug!(tool = self.tool, "stream dropped early, killing tool");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}
