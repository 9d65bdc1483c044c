//! Per-entry status lines.
//!
//! Every entry the walker touches produces exactly one line on stdout, so
//! "nothing to do" outcomes stay distinguishable from failures.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

/// Width used for banners when stdout is not a terminal
const DEFAULT_WIDTH: usize = 80;

#[derive(Debug)]
pub enum Status<'a> {
    Modified { path: &'a Path, count: usize },
    NotModified { path: &'a Path },
    Renamed { path: &'a Path, new_path: &'a Path },
    NotRenamed { path: &'a Path },
    Failed { action: &'a str, path: &'a Path, reason: String },
}

impl fmt::Display for Status<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Modified { path, count } => {
                write!(f, "[MODIFIED {}]: {}", count, path.display())
            }
            Status::NotModified { path } => write!(f, "[NOT MODIFIED]: {}", path.display()),
            Status::Renamed { path, new_path } => {
                write!(f, "[RENAMED]: {} -> {}", path.display(), new_path.display())
            }
            Status::NotRenamed { path } => write!(f, "[NOT RENAMED]: {}", path.display()),
            Status::Failed {
                action,
                path,
                reason,
            } => write!(f, "[ERROR]: Failed to {} {}: {}", action, path.display(), reason),
        }
    }
}

/// Sink for status lines, stdout in a real run
pub struct Reporter {
    out: RefCell<Box<dyn Write>>,
}

impl Reporter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(out: impl Write + 'static) -> Self {
        Self {
            out: RefCell::new(Box::new(out)),
        }
    }

    /// Write one status line
    pub fn emit(&self, status: Status<'_>) {
        let mut out = self.out.borrow_mut();
        if let Err(err) = writeln!(out, "{}", status) {
            log::warn!("Failed to write status line: {}", err);
        }
    }
}

/// Print a pass title centred in a line of dashes as wide as the terminal
pub fn banner(title: &str) {
    let width = console::Term::stdout()
        .size_checked()
        .map(|(_, columns)| columns as usize)
        .unwrap_or(DEFAULT_WIDTH);
    println!("{}", centered(title, width));
}

fn centered(title: &str, width: usize) -> String {
    format!("{:-^width$}", title, width = width)
}

/// In-memory sink whose lines tests can inspect
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct Captured(std::rc::Rc<RefCell<Vec<u8>>>);

#[cfg(test)]
impl Captured {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
