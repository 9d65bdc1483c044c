use crate::archive::ArchiveAdapter;
use crate::error::FilterError;
use crate::report::{Reporter, Status};
use crate::rules::RuleSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a traversal needs, built once per run and passed by reference
pub struct RunContext {
    rules: RuleSet,
    archives: ArchiveAdapter,
    cancel: Arc<AtomicBool>,
    reporter: Reporter,
}

impl RunContext {
    pub fn new(rules: RuleSet, archives: ArchiveAdapter, cancel: Arc<AtomicBool>) -> Self {
        Self {
            rules,
            archives,
            cancel,
            reporter: Reporter::stdout(),
        }
    }

    #[cfg(test)]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn archives(&self) -> &ArchiveAdapter {
        &self.archives
    }

    /// Print the status line of one processed entry
    pub fn report(&self, status: Status<'_>) {
        self.reporter.emit(status);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Fail with [`FilterError::Interrupted`] once the user asked to stop
    pub fn check_cancelled(&self) -> Result<(), FilterError> {
        if self.is_cancelled() {
            return Err(FilterError::Interrupted);
        }
        Ok(())
    }
}
