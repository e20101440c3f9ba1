// ============================================================================
// BACKGROUND REMOVAL — adapter over an external segmentation capability
// ============================================================================
//
// The model itself is a black box: encoded image bytes go in, RGBA PNG bytes
// of the cut-out come back. `CommandRemover` drives an external program over
// stdin/stdout; `ColorKeyRemover` (see `color_removal`) is the offline
// fallback. `RemovalJob` runs one removal at a time on the rayon pool and
// hands the result back through a channel polled by the host loop.

use std::io::Write;
use std::path::{Component, Path};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logger;

/// Model size tier requested from the removal capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    #[default]
    Medium,
    Large,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }
}

/// Pre/post-processing mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Processing {
    #[default]
    Auto,
    None,
}

impl Processing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Processing::Auto => "auto",
            Processing::None => "none",
        }
    }
}

/// Options passed along with every removal request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalConfig {
    pub model: ModelTier,
    pub preprocessing: Processing,
    pub postprocessing: Processing,
    /// Return the alpha mask instead of the cut-out.
    pub return_mask: bool,
    pub skip_confidence: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model: ModelTier::Medium,
            preprocessing: Processing::Auto,
            postprocessing: Processing::Auto,
            return_mask: false,
            skip_confidence: true,
        }
    }
}

impl RemovalConfig {
    /// Environment passed to external removers.
    pub fn env_vars(&self) -> [(&'static str, &'static str); 5] {
        let flag = |b: bool| if b { "1" } else { "0" };
        [
            ("BACKDROP_MODEL", self.model.as_str()),
            ("BACKDROP_PREPROCESSING", self.preprocessing.as_str()),
            ("BACKDROP_POSTPROCESSING", self.postprocessing.as_str()),
            ("BACKDROP_RETURN_MASK", flag(self.return_mask)),
            ("BACKDROP_SKIP_CONFIDENCE", flag(self.skip_confidence)),
        ]
    }
}

#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("a background removal is already running")]
    Busy,
    #[error("no image loaded to remove the background from")]
    NoSource,
    #[error("no background remover command is configured")]
    NoCommand,
    #[error("unsafe remover path '{0}'")]
    UnsafePath(String),
    #[error("failed to start remover '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("remover I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("remover exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("remover returned invalid image data: {0}")]
    InvalidOutput(String),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("remover worker stopped before reporting")]
    Disconnected,
    #[error("remover crashed: {0}")]
    Panicked(String),
}

/// A background-removal capability: encoded image in, RGBA PNG out.
pub trait BackgroundRemover: Send + Sync {
    fn name(&self) -> &str;

    fn remove(&self, input: &[u8], config: &RemovalConfig) -> Result<Vec<u8>, RemovalError>;
}

/// Reject empty programs and paths with `..` traversal components.
pub fn validate_command_path(program: &str) -> Result<(), RemovalError> {
    if program.trim().is_empty() {
        return Err(RemovalError::NoCommand);
    }
    if Path::new(program)
        .components()
        .any(|c| c == Component::ParentDir)
    {
        return Err(RemovalError::UnsafePath(program.to_string()));
    }
    Ok(())
}

/// Runs an external segmentation program: image bytes on stdin, cut-out PNG
/// on stdout. The config travels as `BACKDROP_*` environment variables.
#[derive(Clone, Debug)]
pub struct CommandRemover {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandRemover {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl BackgroundRemover for CommandRemover {
    fn name(&self) -> &str {
        &self.program
    }

    fn remove(&self, input: &[u8], config: &RemovalConfig) -> Result<Vec<u8>, RemovalError> {
        validate_command_path(&self.program)?;
        log::info!(
            "Background removal via '{}' ({} bytes, model {})",
            self.program,
            input.len(),
            config.model.as_str()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(config.env_vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RemovalError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin from its own thread so a large image cannot deadlock
        // against a child that writes before it finishes reading.
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = input.to_vec();
            std::thread::spawn(move || {
                if let Err(e) = stdin.write_all(&bytes) {
                    log::debug!("Remover closed stdin early: {}", e);
                }
            })
        });

        let output = child.wait_with_output()?;
        if let Some(handle) = writer {
            let _ = handle.join();
        }

        if !output.status.success() {
            return Err(RemovalError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        validate_output(&output.stdout)?;
        Ok(output.stdout)
    }
}

/// Removal output must decode as an image.
pub fn validate_output(bytes: &[u8]) -> Result<(), RemovalError> {
    if bytes.is_empty() {
        return Err(RemovalError::InvalidOutput("empty output".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|_| ())
        .map_err(|e| RemovalError::InvalidOutput(e.to_string()))
}

/// Completion message of a removal job.
#[derive(Debug)]
pub struct RemovalOutcome {
    /// Upload generation the job was started for.
    pub generation: u64,
    pub result: Result<Vec<u8>, RemovalError>,
}

/// At most one removal in flight. Results arrive through `poll`.
pub struct RemovalJob {
    sender: mpsc::Sender<RemovalOutcome>,
    receiver: mpsc::Receiver<RemovalOutcome>,
    in_flight: Option<u64>,
}

impl Default for RemovalJob {
    fn default() -> Self {
        Self::new()
    }
}

impl RemovalJob {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Spawn a removal of `input` on the rayon pool.
    pub fn start(
        &mut self,
        remover: Arc<dyn BackgroundRemover>,
        input: Arc<Vec<u8>>,
        config: RemovalConfig,
        generation: u64,
    ) -> Result<(), RemovalError> {
        if self.is_busy() {
            return Err(RemovalError::Busy);
        }
        self.in_flight = Some(generation);
        let sender = self.sender.clone();
        rayon::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                remover.remove(&input, &config)
            }))
            .unwrap_or_else(|payload| Err(RemovalError::Panicked(logger::panic_message(payload.as_ref()))));
            // The receiver is gone when the project was closed mid-removal.
            let _ = sender.send(RemovalOutcome { generation, result });
        });
        Ok(())
    }

    /// Non-blocking check for a finished job.
    pub fn poll(&mut self) -> Option<RemovalOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.in_flight = None;
                Some(outcome)
            }
            Err(_) => None,
        }
    }

    /// Block until the running job reports. Used by the CLI host.
    pub fn wait(&mut self) -> Option<RemovalOutcome> {
        let generation = self.in_flight?;
        let outcome = self.receiver.recv().unwrap_or(RemovalOutcome {
            generation,
            result: Err(RemovalError::Disconnected),
        });
        self.in_flight = None;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Gate {
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl BackgroundRemover for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn remove(&self, input: &[u8], _config: &RemovalConfig) -> Result<Vec<u8>, RemovalError> {
            if let Some(rx) = self.release.lock().unwrap().take() {
                let _ = rx.recv();
            }
            Ok(input.iter().rev().copied().collect())
        }
    }

    struct Crashing;

    impl BackgroundRemover for Crashing {
        fn name(&self) -> &str {
            "crashing"
        }

        fn remove(&self, _input: &[u8], _config: &RemovalConfig) -> Result<Vec<u8>, RemovalError> {
            panic!("segmentation model exploded")
        }
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn default_config_matches_medium_auto() {
        let cfg = RemovalConfig::default();
        assert_eq!(cfg.model, ModelTier::Medium);
        assert_eq!(cfg.preprocessing, Processing::Auto);
        assert_eq!(cfg.postprocessing, Processing::Auto);
        assert!(!cfg.return_mask);
        assert!(cfg.skip_confidence);
        assert!(cfg.env_vars().contains(&("BACKDROP_MODEL", "medium")));
    }

    #[test]
    fn second_start_while_busy_is_rejected() {
        let (tx, rx) = mpsc::channel();
        let remover: Arc<dyn BackgroundRemover> = Arc::new(Gate {
            release: Mutex::new(Some(rx)),
        });
        let mut job = RemovalJob::new();
        let input = Arc::new(vec![1u8, 2, 3]);
        job.start(remover.clone(), input.clone(), RemovalConfig::default(), 7)
            .unwrap();
        assert!(job.is_busy());
        assert!(matches!(
            job.start(remover, input, RemovalConfig::default(), 7),
            Err(RemovalError::Busy)
        ));

        tx.send(()).unwrap();
        let outcome = job.wait().expect("outcome");
        assert_eq!(outcome.generation, 7);
        assert_eq!(outcome.result.unwrap(), vec![3, 2, 1]);
        assert!(!job.is_busy());
    }

    #[test]
    fn crashing_remover_reports_and_frees_the_job() {
        let mut job = RemovalJob::new();
        job.start(Arc::new(Crashing), Arc::new(vec![0u8]), RemovalConfig::default(), 3)
            .unwrap();
        let outcome = job.wait().expect("outcome");
        assert_eq!(outcome.generation, 3);
        match outcome.result {
            Err(RemovalError::Panicked(msg)) => assert!(msg.contains("exploded")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!job.is_busy());
    }

    #[test]
    fn poll_is_empty_when_idle() {
        let mut job = RemovalJob::new();
        assert!(job.poll().is_none());
        assert!(job.wait().is_none());
    }

    #[test]
    fn command_path_validation() {
        assert!(matches!(validate_command_path("  "), Err(RemovalError::NoCommand)));
        assert!(matches!(
            validate_command_path("../bin/remover"),
            Err(RemovalError::UnsafePath(_))
        ));
        assert!(validate_command_path("/usr/local/bin/rembg").is_ok());
        assert!(validate_command_path("rembg").is_ok());
    }

    #[test]
    fn invalid_output_is_reported() {
        assert!(matches!(validate_output(&[]), Err(RemovalError::InvalidOutput(_))));
        assert!(matches!(validate_output(b"nope"), Err(RemovalError::InvalidOutput(_))));
        assert!(validate_output(&tiny_png()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn command_remover_pipes_bytes_through() {
        let png = tiny_png();
        let remover = CommandRemover::new("cat", Vec::new());
        let out = remover.remove(&png, &RemovalConfig::default()).unwrap();
        assert_eq!(out, png);
    }

    #[cfg(unix)]
    #[test]
    fn command_remover_reports_failures() {
        let failing = CommandRemover::new("sh", vec!["-c".into(), "echo boom >&2; exit 3".into()]);
        match failing.remove(&tiny_png(), &RemovalConfig::default()) {
            Err(RemovalError::Exit { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected {other:?}"),
        }

        let garbage = CommandRemover::new("sh", vec!["-c".into(), "cat >/dev/null; echo nope".into()]);
        assert!(matches!(
            garbage.remove(&tiny_png(), &RemovalConfig::default()),
            Err(RemovalError::InvalidOutput(_))
        ));

        let env = CommandRemover::new(
            "sh",
            vec!["-c".into(), "cat >/dev/null; test \"$BACKDROP_MODEL\" = medium".into()],
        );
        // exits 0 with empty stdout: env arrived, output rejected
        assert!(matches!(
            env.remove(&tiny_png(), &RemovalConfig::default()),
            Err(RemovalError::InvalidOutput(_))
        ));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let remover = CommandRemover::new("/nonexistent/backdrop-remover", Vec::new());
        assert!(matches!(
            remover.remove(&tiny_png(), &RemovalConfig::default()),
            Err(RemovalError::Spawn { .. })
        ));
    }
}
