//! Issue report - deduplicated errors and warnings collected during a run
//!
//! Allocation never aborts on a recoverable problem. Each step records what
//! went wrong here and carries on with whatever it could build.

use std::collections::HashSet;
use std::fmt::Display;

use tracing::warn;

/// Accumulates errors and warnings, keeping the first occurrence of each message
#[derive(Debug, Default, Clone)]
pub struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
    seen_errors: HashSet<String>,
    seen_warnings: HashSet<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error; repeated messages are dropped
    pub fn error(&mut self, issue: impl Display) {
        let message = issue.to_string();
        if self.seen_errors.insert(message.clone()) {
            warn!(error = %message, "allocation error recorded");
            self.errors.push(message);
        }
    }

    /// Record a warning; repeated messages are dropped
    pub fn warning(&mut self, issue: impl Display) {
        let message = issue.to_string();
        if self.seen_warnings.insert(message.clone()) {
            warn!(warning = %message, "allocation warning recorded");
            self.warnings.push(message);
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Consume the report, yielding (errors, warnings)
    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.errors, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplicates_by_message() {
        let mut report = Report::new();
        report.error("missing curve for kind 'cmpd'");
        report.error("missing curve for kind 'cmpd'");
        report.warning("control kind 'neg' never supplied");
        report.warning("control kind 'neg' never supplied");

        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.warnings().len(), 1);
        assert!(report.has_errors());
    }

    #[test]
    fn test_keeps_first_seen_order() {
        let mut report = Report::new();
        report.error("first");
        report.error("second");
        report.error("first");

        let (errors, warnings) = report.into_parts();
        assert_eq!(errors, vec!["first".to_string(), "second".to_string()]);
        assert!(warnings.is_empty());
    }
}
