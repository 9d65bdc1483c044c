use crate::error::RenameError;
use crate::rules::RuleSet;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

/// Length of the random prefix used to resolve a name collision
pub const DISAMBIGUATOR_LEN: usize = 5;

/// Give up after this many colliding disambiguators
const MAX_DISAMBIGUATION_ATTEMPTS: usize = 64;

/// Outcome of running the rule set over one entry's name
#[derive(Debug, Clone, PartialEq)]
pub struct RenameResult {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub renamed: bool,
}

/// Rename a file or directory by applying the rules to its base name
///
/// # Arguments
/// * `rules` - Rule set to apply
/// * `path` - Path to rename
///
/// # Returns
/// * `Result<RenameResult, RenameError>` - Old and new path
pub fn rename_path(rules: &RuleSet, path: &Path) -> Result<RenameResult, RenameError> {
    rename_path_with(rules, path, &mut rand::thread_rng())
}

/// Same as [`rename_path`] with a caller supplied random source
pub fn rename_path_with<R: Rng>(
    rules: &RuleSet,
    path: &Path,
    rng: &mut R,
) -> Result<RenameResult, RenameError> {
    let unchanged = || RenameResult {
        old_path: path.to_path_buf(),
        new_path: path.to_path_buf(),
        renamed: false,
    };

    let Some(file_name) = path.file_name() else {
        return Ok(unchanged());
    };
    let old_name = file_name.to_str().ok_or(RenameError::NonUtf8Name)?;
    let (new_name, _) = rules.apply(old_name);

    if new_name == old_name {
        return Ok(unchanged());
    }
    validate_name(&new_name)?;

    let parent = path.parent().unwrap_or(Path::new(""));
    let mut new_path = parent.join(&new_name);

    // A sibling already owns the name, prefix until we find a free one
    let mut attempts = 0;
    while is_taken(&new_path) {
        if attempts == MAX_DISAMBIGUATION_ATTEMPTS {
            return Err(RenameError::NoFreeName {
                name: new_name,
                attempts,
            });
        }
        attempts += 1;
        new_path = parent.join(format!("{}_{}", disambiguator(rng), new_name));
    }

    fs::rename(path, &new_path)?;

    Ok(RenameResult {
        old_path: path.to_path_buf(),
        new_path,
        renamed: true,
    })
}

/// Random alphanumeric prefix for a colliding name
fn disambiguator<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(DISAMBIGUATOR_LEN)
        .map(char::from)
        .collect()
}

fn validate_name(name: &str) -> Result<(), RenameError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains(std::path::MAIN_SEPARATOR)
        || name.contains('\0');

    if invalid {
        return Err(RenameError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn is_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
