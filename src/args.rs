use clap::{ArgAction, Parser};
use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

/// Which passes the run performs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Mode {
    #[default]
    None,              // No modifier given
    ContentOnly,       // Rewrite file contents
    RenameOnly,        // Rewrite file and directory names
    ContentThenRename, // Contents first, then names
}

/// One traversal of the whole tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Content,
    Rename,
}

impl Mode {
    pub fn from_flags(modify: bool, rename: bool) -> Self {
        match (modify, rename) {
            (true, true) => Mode::ContentThenRename,
            (true, false) => Mode::ContentOnly,
            (false, true) => Mode::RenameOnly,
            (false, false) => Mode::None,
        }
    }

    /// Passes in the order they run
    pub fn passes(&self) -> &'static [Pass] {
        match self {
            Mode::None => &[],
            Mode::ContentOnly => &[Pass::Content],
            Mode::RenameOnly => &[Pass::Rename],
            Mode::ContentThenRename => &[Pass::Content, Pass::Rename],
        }
    }
}

impl Pass {
    /// Banner printed before the pass starts
    pub fn title(&self) -> &'static str {
        match self {
            Pass::Content => "MODIFY",
            Pass::Rename => "RENAME",
        }
    }
}

/// Command line arguments parser
#[derive(Parser, Debug)]
#[command(author, version, about = "Replace matched strings in file contents and file names using regular expressions, including inside archives")]
#[command(name = "regex-filter")]
pub struct Args {
    /// Files or directories to process
    #[arg(short = 'i', long = "input", value_name = "PATH", num_args = 1.., required = true, action = ArgAction::Append)]
    pub inputs: Vec<PathBuf>,

    /// JSON file mapping regular expressions to replacements
    #[arg(short = 'f', long = "filter", value_name = "FILE")]
    pub filter: PathBuf,

    /// Directory that receives the REGEX_FILTER result directory
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: PathBuf,

    /// Use the filter to modify file contents
    #[arg(short = 'm', long = "modify")]
    pub modify: bool,

    /// Use the filter to rename files and directories
    #[arg(short = 'r', long = "rename")]
    pub rename: bool,

    /// External archiver for formats without built-in support (7z, 7za, 7zr or 7zz by default)
    #[arg(long = "archiver", value_name = "PROGRAM", env = "REGEX_FILTER_ARCHIVER")]
    pub archiver: Option<PathBuf>,

    /// Only handle the built-in formats (zip, 7z, tar, gzip), even if an archiver is configured
    #[arg(long = "no-archiver")]
    pub no_archiver: bool,

    /// Seconds an external archiver call may take before it is killed
    #[arg(long = "archiver-timeout", value_name = "SECONDS", default_value_t = 300)]
    pub archiver_timeout: u64,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(skip)]
    pub mode: Mode,
}

impl Args {
    pub fn archiver_timeout(&self) -> Duration {
        Duration::from_secs(self.archiver_timeout)
    }
}

/// Parse command line arguments and validate them
///
/// # Returns
/// * `Result<Args>` - Parsed and validated arguments
pub fn parse() -> Result<Args> {
    finish(Args::parse())
}

/// Derive the mode and validate parsed arguments
fn finish(mut args: Args) -> Result<Args> {
    args.mode = Mode::from_flags(args.modify, args.rename);
    validate_args(&args)?;
    Ok(args)
}

/// Validate command line arguments for consistency
///
/// # Arguments
/// * `args` - Command line arguments to validate
///
/// # Returns
/// * `Result<()>` - Ok if valid, Error otherwise
fn validate_args(args: &Args) -> Result<()> {
    if args.mode == Mode::None {
        return Err(anyhow!("Use -m/--modify and/or -r/--rename"));
    }

    if args.archiver_timeout == 0 {
        return Err(anyhow!("--archiver-timeout must be at least 1 second"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(argv: &[&str]) -> Result<Args> {
        let args = Args::try_parse_from(argv)?;
        finish(args)
    }

    #[test]
    fn test_mode_from_flags() {
        let args = parse_from(&["regex-filter", "-i", "a", "b", "-f", "r.json", "-o", "out", "-m"]).unwrap();
        assert_eq!(args.mode, Mode::ContentOnly);
        assert_eq!(args.inputs, vec![PathBuf::from("a"), PathBuf::from("b")]);

        let args = parse_from(&["regex-filter", "-i", "a", "-f", "r.json", "-o", "out", "-r", "-m"]).unwrap();
        assert_eq!(args.mode, Mode::ContentThenRename);
        assert_eq!(args.mode.passes(), &[Pass::Content, Pass::Rename]);

        let args = parse_from(&["regex-filter", "--input", "a", "--filter", "r.json", "--output", "out", "--rename"]).unwrap();
        assert_eq!(args.mode.passes(), &[Pass::Rename]);
    }

    #[test]
    fn test_requires_a_modifier() {
        let err = parse_from(&["regex-filter", "-i", "a", "-f", "r.json", "-o", "out"]).unwrap_err();
        assert!(err.to_string().contains("--modify"));
    }

    #[test]
    fn test_requires_input_filter_and_output() {
        assert!(parse_from(&["regex-filter", "-f", "r.json", "-o", "out", "-m"]).is_err());
        assert!(parse_from(&["regex-filter", "-i", "a", "-o", "out", "-m"]).is_err());
        assert!(parse_from(&["regex-filter", "-i", "a", "-f", "r.json", "-m"]).is_err());
    }

    #[test]
    fn test_archiver_options() {
        let args = parse_from(&["regex-filter", "-i", "a", "-f", "r", "-o", "o", "-m", "--archiver", "/opt/7zz", "--archiver-timeout", "9"]).unwrap();
        assert_eq!(args.archiver, Some(PathBuf::from("/opt/7zz")));
        assert_eq!(args.archiver_timeout(), Duration::from_secs(9));

        assert!(parse_from(&["regex-filter", "-i", "a", "-f", "r", "-o", "o", "-m", "--archiver-timeout", "0"]).is_err());

        let args = parse_from(&["regex-filter", "-i", "a", "-f", "r", "-o", "o", "-m", "--no-archiver"]).unwrap();
        assert!(args.no_archiver);
    }
}
