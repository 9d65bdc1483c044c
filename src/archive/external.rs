//! Generic archives through an external 7-Zip compatible program.
//!
//! The program is only ever run as a blocking child process with stdin
//! closed, a wall-clock deadline, and the shared cancellation flag polled
//! while it runs. Its raw exit code is never used directly: every test run
//! is classified into an [`ArchiverStatus`] first.

use super::{ArchiveHandler, ArchiveKind};
use crate::error::ArchiveError;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Program names tried, in order, when none is configured
pub const CANDIDATES: [&str; 4] = ["7z", "7za", "7zr", "7zz"];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Password passed to every invocation so the tool never asks for one
const NO_PASSWORD: &str = "-p0";

/// What the archiver thinks of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiverStatus {
    /// A readable archive; `format` is the reported type, if any
    Valid { format: Option<String> },
    /// The tool does not recognize the file as an archive
    NotArchive,
    /// The tool recognizes the format but cannot read the archive
    Corrupted { format: Option<String>, detail: String },
    /// The tool could not be started
    Unavailable,
    /// The tool did not finish before the deadline
    TimedOut,
    /// The run was cancelled while the tool was working
    Interrupted,
}

/// Result of one finished child process
enum Invocation {
    Finished { status: ExitStatus, output: String },
    TimedOut,
    Interrupted,
}

/// A 7-Zip compatible program
#[derive(Debug, Clone)]
pub struct ExternalArchiver {
    program: PathBuf,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl ExternalArchiver {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration, cancel: Arc<AtomicBool>) -> Self {
        Self {
            program: program.into(),
            timeout,
            cancel,
        }
    }

    /// Find a usable archiver
    ///
    /// # Arguments
    /// * `explicit` - Program configured by the user; only this one is tried if set
    /// * `timeout` - Deadline for each invocation
    /// * `cancel` - Shared cancellation flag
    ///
    /// # Returns
    /// * `Option<ExternalArchiver>` - The first program that could be started
    pub fn discover(
        explicit: Option<&Path>,
        timeout: Duration,
        cancel: Arc<AtomicBool>,
    ) -> Option<Self> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(program) => vec![program.to_path_buf()],
            None => CANDIDATES.iter().map(PathBuf::from).collect(),
        };

        candidates
            .into_iter()
            .find(|program| Self::can_start(program))
            .map(|program| {
                log::info!("Using external archiver {}", program.display());
                Self::new(program, timeout, cancel.clone())
            })
    }

    fn can_start(program: &Path) -> bool {
        Command::new(program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    pub fn name(&self) -> String {
        self.program.display().to_string()
    }

    /// Test whether `path` is an archive the tool can read
    pub fn test(&self, path: &Path) -> ArchiverStatus {
        let args: [&OsStr; 5] = [
            OsStr::new("t"),
            OsStr::new("-y"),
            OsStr::new(NO_PASSWORD),
            OsStr::new("--"),
            path.as_os_str(),
        ];

        match self.invoke(&args, None) {
            Ok(Invocation::Finished { status, output }) => classify(status.success(), &output),
            Ok(Invocation::TimedOut) => ArchiverStatus::TimedOut,
            Ok(Invocation::Interrupted) => ArchiverStatus::Interrupted,
            Err(err) => {
                log::debug!("Cannot run {}: {}", self.name(), err);
                ArchiverStatus::Unavailable
            }
        }
    }

    /// Extract `archive` into `dest`, overwriting, without a password
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
        let mut out_dir = OsString::from("-o");
        out_dir.push(dest.as_os_str());
        let args: [&OsStr; 6] = [
            OsStr::new("x"),
            OsStr::new("-y"),
            OsStr::new(NO_PASSWORD),
            &out_dir,
            OsStr::new("--"),
            archive.as_os_str(),
        ];
        self.run(&args, None)
    }

    /// Create `dest` holding every entry of `src_dir`
    ///
    /// `format` is the type reported when the original was tested; without
    /// it the tool picks a format from the file name.
    pub fn create(&self, src_dir: &Path, format: Option<&str>, dest: &Path) -> Result<(), ArchiveError> {
        let mut args: Vec<OsString> = vec!["a".into(), "-y".into()];
        if let Some(format) = format {
            args.push(format!("-t{format}").into());
        }
        args.push("--".into());
        args.push(dest.as_os_str().to_os_string());
        // Expanded by the tool itself, relative to the working directory
        args.push("*".into());

        let args: Vec<&OsStr> = args.iter().map(OsString::as_os_str).collect();
        self.run(&args, Some(src_dir))
    }

    /// Run to completion and turn anything but success into an error
    fn run(&self, args: &[&OsStr], cwd: Option<&Path>) -> Result<(), ArchiveError> {
        match self.invoke(args, cwd)? {
            Invocation::Finished { status, .. } if status.success() => Ok(()),
            Invocation::Finished { status, output } => Err(ArchiveError::ToolFailed {
                tool: self.name(),
                detail: failure_detail(&output).unwrap_or_else(|| status.to_string()),
            }),
            Invocation::TimedOut => Err(ArchiveError::TimedOut {
                tool: self.name(),
                seconds: self.timeout.as_secs(),
            }),
            Invocation::Interrupted => Err(ArchiveError::Interrupted { tool: self.name() }),
        }
    }

    /// Spawn the tool and wait for it, bounded by the deadline and the cancel flag
    fn invoke(&self, args: &[&OsStr], cwd: Option<&Path>) -> io::Result<Invocation> {
        // Output goes to a file so a chatty child can never block on a full pipe
        let mut log_file = tempfile::tempfile()?;

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file.try_clone()?));
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn()?;
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(status) = child.try_wait()? {
                let output = read_log(&mut log_file)?;
                log::trace!("{} {:?} exited with {}: {}", self.name(), args, status, output);
                return Ok(Invocation::Finished { status, output });
            }

            if self.cancel.load(Ordering::SeqCst) {
                let _ = child.kill();
                child.wait()?;
                return Ok(Invocation::Interrupted);
            }

            if Instant::now() >= deadline {
                log::warn!("{} timed out, killing it", self.name());
                let _ = child.kill();
                child.wait()?;
                return Ok(Invocation::TimedOut);
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_log(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Classify a finished test run
///
/// A failing run that still printed a `Type = ...` line recognized the
/// format, so the archive is damaged rather than not an archive at all.
pub fn classify(success: bool, output: &str) -> ArchiverStatus {
    let format = reported_format(output);
    if success {
        return ArchiverStatus::Valid { format };
    }

    if output.lines().any(|line| line.trim_start().starts_with("Type =")) {
        let detail = failure_detail(output).unwrap_or_else(|| "test failed".to_string());
        return ArchiverStatus::Corrupted { format, detail };
    }

    ArchiverStatus::NotArchive
}

/// The `Type = ...` value from the tool's listing
fn reported_format(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Type ="))
        .map(|format| format.trim().to_string())
        .find(|format| !format.is_empty())
}

/// The most useful error line of the tool's output
fn failure_detail(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.lines().map(str::trim).collect();
    lines
        .iter()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.iter().find(|line| line.contains("Error")))
        .map(|line| line.to_string())
}

/// Adapter handler backed by the external archiver
pub struct ExternalHandler {
    archiver: ExternalArchiver,
}

impl ExternalHandler {
    pub fn new(archiver: ExternalArchiver) -> Self {
        Self { archiver }
    }
}

impl ArchiveHandler for ExternalHandler {
    fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError> {
        let tool = self.archiver.name();
        match self.archiver.test(path) {
            ArchiverStatus::Valid { format } => Ok(Some(ArchiveKind::External { format })),
            ArchiverStatus::NotArchive | ArchiverStatus::Unavailable => Ok(None),
            ArchiverStatus::Corrupted { format, detail } => {
                log::debug!(
                    "{} looks like a damaged {} archive",
                    path.display(),
                    format.as_deref().unwrap_or("unknown")
                );
                Err(ArchiveError::Corrupted { tool, detail })
            }
            ArchiverStatus::TimedOut => Err(ArchiveError::TimedOut {
                tool,
                seconds: self.archiver.timeout.as_secs(),
            }),
            ArchiverStatus::Interrupted => Err(ArchiveError::Interrupted { tool }),
        }
    }

    fn handles(&self, kind: &ArchiveKind) -> bool {
        matches!(kind, ArchiveKind::External { .. })
    }

    fn extract(&self, archive: &Path, _kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        self.archiver.extract(archive, dest)
    }

    fn repack(&self, src_dir: &Path, kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let format = match kind {
            ArchiveKind::External { format } => format.as_deref(),
            _ => None,
        };
        self.archiver.create(src_dir, format, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_7Z: &str = "\
7-Zip [64] 16.02 : Copyright (c) 1999-2016 Igor Pavlov : 2016-05-21

Testing archive: pack.7z
--
Path = pack.7z
Type = 7z
Physical Size = 140

Everything is Ok
";

    const DAMAGED_7Z: &str = "\
Testing archive: pack.7z
--
Path = pack.7z
Type = 7z
ERRORS:
Unexpected end of archive

ERROR: Data Error : notes.txt
";

    const NOT_ARCHIVE: &str = "\
Testing archive: notes.txt
ERROR: notes.txt
Can not open the file as archive

Errors: 1
";

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(true, VALID_7Z),
            ArchiverStatus::Valid { format: Some("7z".to_string()) }
        );
        assert_eq!(
            classify(false, DAMAGED_7Z),
            ArchiverStatus::Corrupted {
                format: Some("7z".to_string()),
                detail: "ERROR: Data Error : notes.txt".to_string(),
            }
        );
        assert_eq!(classify(false, NOT_ARCHIVE), ArchiverStatus::NotArchive);
        assert_eq!(classify(true, ""), ArchiverStatus::Valid { format: None });
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let cancel = Arc::new(AtomicBool::new(false));
        let archiver = ExternalArchiver::new(
            "regex-filter-no-such-archiver",
            Duration::from_secs(5),
            cancel.clone(),
        );
        assert_eq!(archiver.test(Path::new("whatever")), ArchiverStatus::Unavailable);

        let found = ExternalArchiver::discover(
            Some(Path::new("regex-filter-no-such-archiver")),
            Duration::from_secs(5),
            cancel,
        );
        assert!(found.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_the_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow-archiver");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let archiver = ExternalArchiver::new(
            &script,
            Duration::from_millis(200),
            Arc::new(AtomicBool::new(false)),
        );
        let started = Instant::now();
        assert_eq!(archiver.test(Path::new("x")), ArchiverStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_classified() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-archiver");
        std::fs::write(&script, "#!/bin/sh\necho 'Type = rar'\necho 'ERROR: CRC Failed'\nexit 2\n")
            .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let archiver = ExternalArchiver::new(&script, Duration::from_secs(10), Arc::new(AtomicBool::new(false)));
        assert_eq!(
            archiver.test(Path::new("x")),
            ArchiverStatus::Corrupted {
                format: Some("rar".to_string()),
                detail: "ERROR: CRC Failed".to_string(),
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_adapter_drives_archiver_calls() {
        use crate::archive::fixtures::fake_archiver;
        use crate::archive::ArchiveAdapter;
        use std::fs;

        let dir = tempfile::TempDir::new().unwrap();
        let work = tempfile::TempDir::new().unwrap();
        let (script, log) = fake_archiver(dir.path());
        let archiver = ExternalArchiver::new(&script, Duration::from_secs(10), Arc::new(AtomicBool::new(false)));
        let adapter = ArchiveAdapter::new(work.path(), Some(archiver));

        let archive = dir.path().join("bundle.fake");
        fs::write(&archive, "FAKEARC\nsecret stuff").unwrap();

        let kind = adapter.probe(&archive).unwrap().unwrap();
        assert_eq!(kind, ArchiveKind::External { format: Some("fake".to_string()) });

        let extraction = adapter.extract(&archive, kind).unwrap();
        let extracted_to = extraction.path().display().to_string();
        let extracted_cwd = extraction.path().canonicalize().unwrap();
        let member = extraction.path().join("inner.txt");
        assert_eq!(fs::read_to_string(&member).unwrap(), "secret stuff");

        fs::write(&member, "REDACTED stuff").unwrap();
        adapter.repack(extraction, &archive).unwrap();
        assert_eq!(fs::read_to_string(&archive).unwrap(), "FAKEARC\nREDACTED stuff");

        let log = fs::read_to_string(&log).unwrap();
        let calls: Vec<(&str, &str)> = log
            .lines()
            .map(|line| line.split_once('|').unwrap())
            .collect();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, format!("t -y -p0 -- {}", archive.display()));
        assert_eq!(
            calls[1].1,
            format!("x -y -p0 -o{} -- {}", extracted_to, archive.display())
        );

        // Repacking runs inside the extraction so "*" names its entries
        let (cwd, args) = calls[2];
        assert_eq!(Path::new(cwd), extracted_cwd);
        assert!(args.starts_with("a -y -tfake -- "), "{args}");
        assert!(args.ends_with("/bundle.fake *"), "{args}");
    }

    #[cfg(unix)]
    #[test]
    fn test_handler_maps_test_results() {
        use crate::archive::fixtures::fake_archiver;
        use std::fs;

        let dir = tempfile::TempDir::new().unwrap();
        let (script, _log) = fake_archiver(dir.path());
        let handler = ExternalHandler::new(ExternalArchiver::new(
            &script,
            Duration::from_secs(10),
            Arc::new(AtomicBool::new(false)),
        ));

        let plain = dir.path().join("plain.txt");
        fs::write(&plain, "secret").unwrap();
        assert_eq!(handler.probe(&plain).unwrap(), None);

        let broken = dir.path().join("broken.fake");
        fs::write(&broken, "BROKENARC\nsecret").unwrap();
        assert!(matches!(
            handler.probe(&broken),
            Err(ArchiveError::Corrupted { detail, .. }) if detail == "ERROR: Unexpected end of archive"
        ));
    }
}
