use crate::encoding;
use crate::error::ContentError;
use crate::rules::RuleSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of running the rule set over one file's contents
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationResult {
    pub path: PathBuf,
    pub changed: bool,
    pub substitutions: usize,
}

/// Replace content in a file in place
///
/// The file is only written when at least one substitution happened, and it
/// is written in the same encoding it was read with.
///
/// # Arguments
/// * `rules` - Rule set to apply
/// * `file_path` - Path to the file to process
///
/// # Returns
/// * `Result<ModificationResult, ContentError>` - What happened to the file
pub fn modify_file(rules: &RuleSet, file_path: &Path) -> Result<ModificationResult, ContentError> {
    let bytes = fs::read(file_path)?;
    let decoded = encoding::decode(&bytes)?;

    let (replaced, substitutions) = rules.apply(&decoded.text);

    if substitutions == 0 {
        // Leave the file alone, not even a write
        return Ok(ModificationResult {
            path: file_path.to_path_buf(),
            changed: false,
            substitutions: 0,
        });
    }

    let encoded = encoding::encode(&decoded, &replaced)?;
    fs::write(file_path, encoded)?;

    Ok(ModificationResult {
        path: file_path.to_path_buf(),
        changed: true,
        substitutions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn rule_set(pairs: &[(&str, &str)]) -> RuleSet {
        let rules = pairs
            .iter()
            .map(|(pattern, replacement)| Rule::new(pattern, replacement).unwrap())
            .collect();
        RuleSet::from_rules(rules).unwrap()
    }

    #[test]
    fn test_modifies_and_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "Foo123").unwrap();

        let result = modify_file(&rule_set(&[("foo", "bar")]), &path).unwrap();
        assert!(result.changed);
        assert_eq!(result.substitutions, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "bar123");
    }

    #[test]
    fn test_count_follows_progressive_substitution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "cat dog").unwrap();

        // "cat" becomes "dog", so the second rule sees two dogs
        let rules = rule_set(&[("cat", "dog"), ("dog", "bird")]);
        let result = modify_file(&rules, &path).unwrap();
        assert_eq!(result.substitutions, 3);
        assert_eq!(fs::read_to_string(&path).unwrap(), "bird bird");
    }

    #[test]
    fn test_unmatched_file_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "nothing to see").unwrap();
        let old = FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&path, old).unwrap();

        let result = modify_file(&rule_set(&[("secret", "x")]), &path).unwrap();
        assert!(!result.changed);
        assert_eq!(result.substitutions, 0);

        let meta = fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
        assert_eq!(fs::read_to_string(&path).unwrap(), "nothing to see");
    }

    #[test]
    fn test_keeps_legacy_encoding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin.txt");
        fs::write(&path, b"Caf\xE9 au lait avec foo, d\xE9j\xE0 vu".as_slice()).unwrap();

        let result = modify_file(&rule_set(&[("foo", "bar")]), &path).unwrap();
        assert!(result.changed);
        assert_eq!(
            fs::read(&path).unwrap(),
            b"Caf\xE9 au lait avec bar, d\xE9j\xE0 vu".to_vec()
        );
    }

    #[test]
    fn test_binary_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        let bytes = [0x00, 0x01, b'f', b'o', b'o', 0x00];
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            modify_file(&rule_set(&[("foo", "bar")]), &path),
            Err(ContentError::Binary)
        ));
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }
}
