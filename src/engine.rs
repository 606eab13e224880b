//! The external conversion engine.
//!
//! The engine turns a DOCX or Markdown file into Markdown or JATS text. The
//! library never parses DOCX itself; it drives `pandoc` and repairs what comes
//! back. [`ConversionEngine`] is the seam: tests and embedders can supply their
//! own implementation through [`crate::ConversionConfig::engine`].

use crate::config::{SourceFormat, TargetFormat};
use crate::error::ConvertError;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A document converter invoked as a blocking call.
///
/// Implementations must be callable from several threads at once; each call
/// is independent.
pub trait ConversionEngine: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Human-readable version string.
    fn version(&self) -> Result<String, ConvertError>;

    /// Convert `input` (of format `source`) and return the produced text.
    fn convert(
        &self,
        input: &Path,
        source: SourceFormat,
        target: TargetFormat,
    ) -> Result<String, ConvertError>;
}

/// `pandoc` run as a child process, output captured from stdout.
#[derive(Debug, Clone)]
pub struct PandocEngine {
    binary: PathBuf,
    timeout: Option<Duration>,
}

const PANDOC: &str = "pandoc";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl PandocEngine {
    /// Use the given binary without checking it exists.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Find the binary: an explicit path (or bare name resolved on `PATH`),
    /// otherwise `pandoc` on `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ConvertError> {
        let wanted = explicit.unwrap_or_else(|| Path::new(PANDOC));
        if explicit.is_some() && wanted.is_file() {
            return Ok(Self::new(wanted));
        }
        match which::which(wanted) {
            Ok(path) => {
                debug!("Using engine binary {}", path.display());
                Ok(Self::new(path))
            }
            Err(_) => Err(ConvertError::EngineNotFound {
                name: wanted.display().to_string(),
            }),
        }
    }

    /// Kill the child process if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command-line arguments for one conversion.
    pub fn args_for(input: &Path, source: SourceFormat, target: TargetFormat) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            input.as_os_str().to_os_string(),
            "--from".into(),
            source.engine_name().into(),
        ];
        let rest: &[&str] = match target {
            TargetFormat::Markdown => &[
                "--to",
                "markdown+multiline_tables",
                "--wrap=none",
                "--markdown-headings=atx",
                "--reference-location=document",
            ],
            TargetFormat::Jats => &[
                "--to",
                "jats_archiving",
                "--standalone",
                "--wrap=none",
                "--reference-location=document",
            ],
        };
        args.extend(rest.iter().map(OsString::from));
        args
    }

    fn run(&self, args: &[OsString], input: &Path) -> Result<String, ConvertError> {
        debug!("Running {} {:?}", self.binary.display(), args);
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConvertError::EngineNotFound {
                    name: self.binary.display().to_string(),
                },
                _ => ConvertError::Internal(format!(
                    "Failed to launch {}: {}",
                    self.binary.display(),
                    e
                )),
            })?;

        // Drain both pipes on their own threads so a chatty engine never
        // blocks on a full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ConvertError::EngineTimeout {
                            path: input.to_path_buf(),
                            secs: self.timeout.map_or(0, |t| t.as_secs()),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(ConvertError::Internal(format!("Engine wait failed: {e}"))),
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr.join().unwrap_or_default())
            .trim()
            .to_string();

        if !status.success() {
            return Err(ConvertError::EngineFailed {
                status: status.to_string(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            warn!("{}: {}", self.name(), stderr);
        }
        String::from_utf8(stdout)
            .map_err(|e| ConvertError::Internal(format!("Engine output is not UTF-8: {e}")))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// First non-empty line of `--version` output.
fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

impl ConversionEngine for PandocEngine {
    fn name(&self) -> &str {
        PANDOC
    }

    fn version(&self) -> Result<String, ConvertError> {
        let out = self.run(&[OsString::from("--version")], &self.binary)?;
        first_line(&out).ok_or_else(|| ConvertError::EngineFailed {
            status: "ok".into(),
            stderr: "empty --version output".into(),
        })
    }

    fn convert(
        &self,
        input: &Path,
        source: SourceFormat,
        target: TargetFormat,
    ) -> Result<String, ConvertError> {
        self.run(&Self::args_for(input, source, target), input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_args_for_markdown() {
        let args = PandocEngine::args_for(Path::new("in.docx"), SourceFormat::Docx, TargetFormat::Markdown);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "in.docx",
                "--from",
                "docx",
                "--to",
                "markdown+multiline_tables",
                "--wrap=none",
                "--markdown-headings=atx",
                "--reference-location=document"
            ]
        );
    }

    #[test]
    fn test_args_for_jats() {
        let args = PandocEngine::args_for(Path::new("in.md"), SourceFormat::Markdown, TargetFormat::Jats);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"jats_archiving".to_string()));
        assert!(args.contains(&"--standalone".to_string()));
        assert_eq!(args[2], "markdown");
    }

    #[test]
    fn test_locate_missing_binary() {
        let err = PandocEngine::locate(Some(Path::new("/no/such/pandoc-binary"))).unwrap_err();
        assert!(matches!(err, ConvertError::EngineNotFound { .. }));
    }

    #[test]
    fn test_first_line() {
        assert_eq!(
            first_line("\npandoc 3.1.9\nFeatures: +server\n").as_deref(),
            Some("pandoc 3.1.9")
        );
        assert_eq!(first_line("  \n"), None);
    }

    /// `sh` runs the input file as a script, standing in for the engine.
    #[cfg(unix)]
    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("input.md");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{body}").unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_is_captured() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "echo \"<article/>\"; echo 'warning: ignored' >&2");
        let engine = PandocEngine::new("/bin/sh");
        let out = engine.convert(&input, SourceFormat::Markdown, TargetFormat::Jats).unwrap();
        assert_eq!(out.trim(), "<article/>");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_engine_failure() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "echo 'Unknown reader' >&2; exit 3");
        let err = PandocEngine::new("/bin/sh")
            .convert(&input, SourceFormat::Markdown, TargetFormat::Jats)
            .unwrap_err();
        match err {
            ConvertError::EngineFailed { stderr, .. } => assert_eq!(stderr, "Unknown reader"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_engine() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "sleep 5");
        let started = Instant::now();
        let err = PandocEngine::new("/bin/sh")
            .with_timeout(Duration::from_millis(200))
            .convert(&input, SourceFormat::Markdown, TargetFormat::Jats)
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
