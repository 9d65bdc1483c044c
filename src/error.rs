//! Error types for regex-filter
//!
//! `FilterError` aborts the whole run. The other enums describe failures that
//! only affect a single entry: the walker reports them and moves on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort the run before the output location is touched
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Rule file not found: {}", path.display())]
    RuleFileNotFound { path: PathBuf },

    #[error("Failed to read rule file {}: {source}", path.display())]
    RuleFileRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse rule file {}: {source}", path.display())]
    RuleFileParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Rule file must be a JSON object mapping patterns to replacements")]
    RuleFileShape,

    #[error("Replacement for pattern '{pattern}' must be a string")]
    NonStringReplacement { pattern: String },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Rule file contains no rules")]
    EmptyRuleSet,

    #[error("Input path does not exist: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Input name '{name}' is given more than once")]
    DuplicateInput { name: String },

    #[error("Interrupted")]
    Interrupted,
}

/// Failures while probing, extracting or repacking one archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    SevenZip(#[from] zesven::Error),

    #[error("{0}")]
    Lzma(#[from] xz2::stream::Error),

    #[error("gzip archive must hold exactly one file, found {found}")]
    GzipMembers { found: usize },

    #[error("{tool} reports a damaged archive: {detail}")]
    Corrupted { tool: String, detail: String },

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("{tool} did not finish within {seconds}s")]
    TimedOut { tool: String, seconds: u64 },

    #[error("{tool} was interrupted")]
    Interrupted { tool: String },

    #[error("no handler for archive kind {0}")]
    Unsupported(String),
}

/// Failures while reading or rewriting file contents
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("binary content")]
    Binary,

    #[error("could not decode as {encoding}")]
    Undecodable { encoding: &'static str },

    #[error("replacement text cannot be encoded as {encoding}")]
    Unencodable { encoding: &'static str },
}

/// Failures while renaming an entry
#[derive(Error, Debug)]
pub enum RenameError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("name is not valid UTF-8")]
    NonUtf8Name,

    #[error("rules produce an invalid name '{name}'")]
    InvalidName { name: String },

    #[error("no free name for '{name}' after {attempts} attempts")]
    NoFreeName { name: String, attempts: usize },
}
