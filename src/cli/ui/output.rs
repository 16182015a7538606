use console::style;

use crate::stream::{TransferFailure, TransferReport};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        eprintln!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    pub fn detail(&self, label: &str, value: &str) {
        eprintln!("  {:<10} {}", style(label).dim(), value);
    }

    /// Summarize a finished transfer on stderr (stdout may carry the payload)
    pub fn report(&self, verb: &str, target: &str, report: &TransferReport) {
        self.success(&format!(
            "{} {} ({} bytes, {} chunk(s), {})",
            verb, target, report.bytes, report.chunks, report.outcome
        ));
        self.detail("sha256", &report.sha256);
        for suppressed in &report.suppressed {
            self.warning(&format!("suppressed: {}", suppressed));
        }
    }

    pub fn failure(&self, failure: &TransferFailure) {
        self.error(&format!(
            "[{}] {} ({})",
            failure.error.category(),
            failure.error,
            failure.outcome
        ));
        for suppressed in &failure.suppressed {
            self.warning(&format!("suppressed: {}", suppressed));
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
