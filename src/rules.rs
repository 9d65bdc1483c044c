use crate::error::FilterError;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// A single pattern -> replacement rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Compiled, case-insensitive pattern
    pub pattern: Regex,

    /// Replacement string, may reference capture groups as `$1` or `${name}`
    pub replacement: String,
}

impl Rule {
    /// Compile a rule. Matching is always case-insensitive.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, FilterError> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            pattern: compiled,
            replacement: replacement.to_string(),
        })
    }

    /// Apply this rule to `text`, returning the new text and the match count
    pub fn apply(&self, text: &str) -> (String, usize) {
        let count = self.pattern.find_iter(text).count();
        if count == 0 {
            return (text.to_string(), 0);
        }

        let replaced = self
            .pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned();
        (replaced, count)
    }
}

/// The ordered rule set loaded from a rule file
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Load rules from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to a JSON object of `"pattern": "replacement"` pairs
    ///
    /// # Returns
    /// * `Result<RuleSet, FilterError>` - Rules in file order
    pub fn load(path: &Path) -> Result<Self, FilterError> {
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                FilterError::RuleFileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                FilterError::RuleFileRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let value: Value =
            serde_json::from_str(&text).map_err(|source| FilterError::RuleFileParse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_value(&value)
    }

    /// Build rules from an already parsed JSON value
    ///
    /// Key order of the object is the application order.
    pub fn from_value(value: &Value) -> Result<Self, FilterError> {
        let object = value.as_object().ok_or(FilterError::RuleFileShape)?;

        let mut rules = Vec::with_capacity(object.len());
        for (pattern, replacement) in object {
            let replacement =
                replacement
                    .as_str()
                    .ok_or_else(|| FilterError::NonStringReplacement {
                        pattern: pattern.clone(),
                    })?;
            rules.push(Rule::new(pattern, replacement)?);
        }

        Self::from_rules(rules)
    }

    /// Wrap a list of compiled rules. An empty list is rejected.
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, FilterError> {
        if rules.is_empty() {
            return Err(FilterError::EmptyRuleSet);
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Apply every rule once, in order, to the same buffer
    ///
    /// # Arguments
    /// * `text` - The text to rewrite
    ///
    /// # Returns
    /// * `(String, usize)` - Rewritten text and the total number of substitutions
    pub fn apply(&self, text: &str) -> (String, usize) {
        let mut result = text.to_string();
        let mut total = 0;

        // Each rule sees the output of the previous one
        for rule in &self.rules {
            let (replaced, count) = rule.apply(&result);
            if count > 0 {
                result = replaced;
                total += count;
            }
        }

        (result, total)
    }
}
