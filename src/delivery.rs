//! Delivery shim: hands a recipient and a payload to Messages via osascript.
//!
//! A single attempt goes `Normalizing -> Invoking -> {Succeeded, Failed}`.
//! The image path adds `Selecting -> Downloading` in front and, when either
//! the download or the send fails, one fallback text send.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rand::seq::IndexedRandom;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::applescript::{ScriptInvocation, ServiceKind};
use crate::images::{DEFAULT_FALLBACK_TEXT, DownloadError, ImageFetcher};
use crate::probe;
use crate::validators::validate_recipient;

/// How often a running osascript is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error type for delivery operations
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Rejected before anything ran
    #[error("Invalid delivery request: {0}")]
    InvalidRequest(String),

    /// osascript could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// osascript ran and reported failure
    #[error("AppleScript error: {}", failure_text(.status, .stderr))]
    Failed { status: Option<i32>, stderr: String },

    /// osascript was killed after running too long
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    /// I/O error while talking to the child or preparing a payload
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn failure_text(status: &Option<i32>, stderr: &str) -> String {
    describe_failure(*status, stderr)
}

fn describe_failure(status: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    match (status, stderr.is_empty()) {
        (_, false) => stderr.to_string(),
        (Some(code), true) => format!("exited with code {}", code),
        (None, true) => "terminated by signal".to_string(),
    }
}

/// Captured result of one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    /// Turn a non-zero exit into [`DeliveryError::Failed`].
    pub fn into_result(self) -> Result<ScriptOutput, DeliveryError> {
        if self.success {
            Ok(self)
        } else {
            Err(DeliveryError::Failed {
                status: self.status,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs an AppleScript program with arguments.
///
/// Implementations only fail when the script could not be run at all; a
/// script that ran and failed comes back as `ScriptOutput { success: false }`.
pub trait ScriptRunner {
    fn run(&self, invocation: &ScriptInvocation) -> Result<ScriptOutput, DeliveryError>;
}

/// Runs scripts through the `osascript` binary.
#[derive(Debug, Clone)]
pub struct OsascriptRunner {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl OsascriptRunner {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl ScriptRunner for OsascriptRunner {
    fn run(&self, invocation: &ScriptInvocation) -> Result<ScriptOutput, DeliveryError> {
        let mut child = Command::new(&self.program)
            .arg("-e")
            .arg(invocation.script)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DeliveryError::Spawn {
                program: self.program_name(),
                source,
            })?;

        let pid = child.id();
        debug!(pid, program = %self.program_name(), "osascript_spawned");

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        warn!(pid, timeout_secs = timeout.as_secs(), "osascript_timed_out");
                        // Readers are left to finish on their own; a grandchild may
                        // still hold the pipes open.
                        return Err(DeliveryError::TimedOut {
                            program: self.program_name(),
                            timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
            None => child.wait()?,
        };

        let result = ScriptOutput {
            success: status.success(),
            status: status.code(),
            stdout: String::from_utf8_lossy(&collect(stdout)?).into_owned(),
            stderr: String::from_utf8_lossy(&collect(stderr)?).into_owned(),
        };

        debug!(pid, success = result.success, status = ?result.status, "osascript_finished");
        Ok(result)
    }
}

type PipeReader = thread::JoinHandle<io::Result<Vec<u8>>>;

/// Read a child pipe to the end on its own thread so the child never blocks
/// on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: PipeReader) -> io::Result<Vec<u8>> {
    reader
        .join()
        .map_err(|_| io::Error::other("pipe reader panicked"))?
}

/// Strip the punctuation people type into phone numbers.
///
/// Removes `-`, `(`, `)` and whitespace; everything else is kept as-is so
/// e-mail handles and `+` prefixes survive.
pub fn normalize_recipient(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | '(' | ')') && !c.is_whitespace())
        .collect()
}

/// Result of the random image send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// The image went out.
    Delivered { url: String },
    /// The image failed and the fallback text was sent instead.
    FellBackToText { reason: String },
}

/// Result of the connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    Reachable,
    Unreachable { diagnostic: String },
}

/// Why the image half of an image send failed.
#[derive(Debug, Error)]
enum ImageAttemptError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Send(#[from] DeliveryError),
}

/// Sends text, files and random images through Messages.
pub struct DeliveryShim {
    runner: Box<dyn ScriptRunner>,
    fetcher: Box<dyn ImageFetcher>,
    service: ServiceKind,
    fallback_text: String,
    temp_dir: Option<PathBuf>,
}

impl DeliveryShim {
    pub fn new(runner: Box<dyn ScriptRunner>, fetcher: Box<dyn ImageFetcher>) -> Self {
        Self {
            runner,
            fetcher,
            service: ServiceKind::default(),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
            temp_dir: None,
        }
    }

    pub fn with_service(mut self, service: ServiceKind) -> Self {
        self.service = service;
        self
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    /// Directory for transient image files; the system temp dir when unset.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Send a text body.
    pub fn send_text(&self, recipient: &str, body: &str) -> Result<(), DeliveryError> {
        let recipient = prepare_recipient(recipient)?;
        if body.trim().is_empty() {
            return Err(DeliveryError::InvalidRequest(
                "Message cannot be empty".to_string(),
            ));
        }

        debug!(recipient = %recipient, chars = body.chars().count(), "send_text_invoking");
        let invocation = ScriptInvocation::send_text(&recipient, body, self.service);
        self.invoke(&recipient, &invocation)
    }

    /// Send a local file.
    pub fn send_file(&self, recipient: &str, path: &Path) -> Result<(), DeliveryError> {
        let recipient = prepare_recipient(recipient)?;
        let path_str = path.to_str().ok_or_else(|| {
            DeliveryError::InvalidRequest(format!("File path is not UTF-8: {}", path.display()))
        })?;

        debug!(recipient = %recipient, path = %path_str, "send_file_invoking");
        let invocation = ScriptInvocation::send_file(&recipient, path_str, self.service);
        self.invoke(&recipient, &invocation)
    }

    /// Download one of `candidate_urls` at random and send it.
    ///
    /// Any failure in the download or the send is answered with one text send
    /// of the fallback message. Only a failure of that fallback is an error.
    /// The transient file is removed on every path.
    pub fn fetch_and_send_random_image(
        &self,
        recipient: &str,
        candidate_urls: &[String],
    ) -> Result<ImageOutcome, DeliveryError> {
        let recipient = prepare_recipient(recipient)?;

        match self.try_send_image(&recipient, candidate_urls) {
            Ok(url) => {
                info!(recipient = %recipient, url = %url, "image_delivered");
                Ok(ImageOutcome::Delivered { url })
            }
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "image_failed_sending_fallback");
                self.send_text(&recipient, &self.fallback_text)?;
                Ok(ImageOutcome::FellBackToText {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run a no-op script to check that Messages can be scripted.
    pub fn test_connectivity(&self) -> Result<Connectivity, DeliveryError> {
        let output = self.runner.run(&ScriptInvocation::probe())?;
        if output.success {
            info!("connectivity_ok");
            Ok(Connectivity::Reachable)
        } else {
            let diagnostic = describe_failure(output.status, &output.stderr);
            warn!(diagnostic = %diagnostic, "connectivity_failed");
            Ok(Connectivity::Unreachable { diagnostic })
        }
    }

    /// Other participant of the frontmost Messages conversation.
    pub fn active_participant(&self) -> Result<Option<String>, DeliveryError> {
        probe::active_participant(self.runner.as_ref())
    }

    fn try_send_image(&self, recipient: &str, urls: &[String]) -> Result<String, ImageAttemptError> {
        let url = urls
            .choose(&mut rand::rng())
            .ok_or(DownloadError::NoCandidates)?;
        debug!(url = %url, candidates = urls.len(), "image_selected");

        let mut transient = self.transient_file().map_err(DownloadError::Io)?;
        debug!(path = %transient.path().display(), "image_downloading");
        self.fetcher.fetch(url, transient.as_file_mut())?;
        transient.as_file_mut().flush().map_err(DownloadError::Io)?;

        self.send_file(recipient, transient.path())?;
        Ok(url.clone())
    }

    fn transient_file(&self) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("spam-reply-").suffix(".jpg");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }

    fn invoke(&self, recipient: &str, invocation: &ScriptInvocation) -> Result<(), DeliveryError> {
        match self.runner.run(invocation).and_then(ScriptOutput::into_result) {
            Ok(_) => {
                info!(recipient = %recipient, "delivery_succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "delivery_failed");
                Err(e)
            }
        }
    }
}

fn prepare_recipient(raw: &str) -> Result<String, DeliveryError> {
    let recipient = normalize_recipient(raw);
    match validate_recipient(&recipient) {
        Some(e) => Err(DeliveryError::InvalidRequest(e)),
        None => Ok(recipient),
    }
}
