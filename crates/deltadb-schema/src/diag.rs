use serde::Serialize;
use std::fmt;

///
/// Severity
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[remain::sorted]
pub enum Severity {
    Error,
    Warning,
}

///
/// Issue
///
/// One validation finding with a stable machine-readable code and a
/// human-readable location.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: &'static str,
    pub location: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{}] {}: {}",
            self.severity, self.code, self.location, self.message
        )
    }
}

///
/// Diagnostics
///
/// Collect-then-report accumulator. Validation passes never short-circuit;
/// callers decide how to interpret the collected issues.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Diagnostics {
    pub issues: Vec<Issue>,
}

impl Diagnostics {
    #[must_use]
    pub const fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn error(&mut self, code: &'static str, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            severity: Severity::Error,
            code,
            location: location.into(),
            message: message.into(),
        });
    }

    pub fn warning(
        &mut self,
        code: &'static str,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(Issue {
            severity: Severity::Warning,
            code,
            location: location.into(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "no issues");
        }
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }

        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_and_warnings_separately() {
        let mut diag = Diagnostics::new();
        assert!(!diag.has_errors());

        diag.warning("test.warn", "here", "a warning");
        assert!(!diag.has_errors());
        assert_eq!(diag.warning_count(), 1);

        diag.error("test.err", "there", "an error");
        assert!(diag.has_errors());
        assert_eq!(diag.warning_count(), 1);
    }
}
