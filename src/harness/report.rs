//! TAP (Test Anything Protocol) stage reporter.
//!
//! Each probe stage becomes one TAP test line, so serial output from QEMU
//! or a real board can be parsed by standard TAP consumers:
//!
//! ```text
//! TAP version 14
//! 1..4
//! ok 1 - entropy battery
//! not ok 2 - link established
//! # Timeout waiting for Wi-Fi connection
//! ok 3 - coap exchange # SKIP link down
//! ```

use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::warn;

/// Result type for stage functions.
pub type StageResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Extract a human-readable message from a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Writes TAP lines for each recorded stage.
pub struct TapReporter<W: Write = io::Stdout> {
    out: W,
    run: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl TapReporter<io::Stdout> {
    /// Reporter writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TapReporter<W> {
    /// Reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            run: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!("TAP output failed: {}", e);
        }
    }

    /// Print the TAP header. Call this before recording stages.
    pub fn header(&mut self, planned: usize) {
        self.line("TAP version 14");
        self.line(&format!("1..{}", planned));
    }

    /// Print a diagnostic comment.
    pub fn comment(&mut self, msg: &str) {
        self.line(&format!("# {}", msg));
    }

    /// Record a stage that passed.
    pub fn ok(&mut self, name: &str) {
        self.run += 1;
        self.passed += 1;
        let n = self.run;
        self.line(&format!("ok {} - {}", n, name));
    }

    /// Record a stage that failed, with a diagnostic reason.
    pub fn not_ok(&mut self, name: &str, reason: &str) {
        self.run += 1;
        self.failed += 1;
        let n = self.run;
        self.line(&format!("not ok {} - {}", n, name));
        self.comment(reason);
    }

    /// Record a stage that was not run.
    pub fn skip(&mut self, name: &str, reason: &str) {
        self.run += 1;
        self.skipped += 1;
        let n = self.run;
        self.line(&format!("ok {} - {} # SKIP {}", n, name, reason));
    }

    /// Record a pass/fail check.
    pub fn check(&mut self, name: &str, passed: bool, reason: &str) -> bool {
        if passed {
            self.ok(name);
        } else {
            self.not_ok(name, reason);
        }
        passed
    }

    /// Run a stage function and record its result. Panics are caught and
    /// recorded as failures.
    pub fn run<F>(&mut self, name: &str, stage: F) -> bool
    where
        F: FnOnce() -> StageResult,
    {
        match catch_unwind(AssertUnwindSafe(stage)) {
            Ok(Ok(())) => {
                self.ok(name);
                true
            }
            Ok(Err(e)) => {
                self.not_ok(name, &format!("Error: {}", e));
                false
            }
            Err(payload) => {
                self.not_ok(name, &format!("Panic: {}", panic_message(payload.as_ref())));
                false
            }
        }
    }

    /// Print the summary footer. Returns true if nothing failed.
    pub fn finish(&mut self) -> bool {
        self.line("# -----------------------");
        self.line(&format!("# Stages run: {}", self.run));
        self.line(&format!("# Passed: {}", self.passed));
        self.line(&format!("# Failed: {}", self.failed));
        if self.skipped > 0 {
            self.line(&format!("# Skipped: {}", self.skipped));
        }
        let ok = self.failed == 0;
        self.line(if ok { "# Result: PASS" } else { "# Result: FAIL" });
        ok
    }

    /// Number of stages recorded.
    pub fn stages_run(&self) -> usize {
        self.run
    }

    /// Number of stages passed.
    pub fn stages_passed(&self) -> usize {
        self.passed
    }

    /// Number of stages failed.
    pub fn stages_failed(&self) -> usize {
        self.failed
    }

    /// Consume the reporter, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(reporter: TapReporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_reporter_counts() {
        let mut reporter = TapReporter::new(Vec::new());
        reporter.header(3);
        reporter.ok("first");
        reporter.not_ok("second", "broken");
        reporter.skip("third", "not reached");

        assert_eq!(reporter.stages_run(), 3);
        assert_eq!(reporter.stages_passed(), 1);
        assert_eq!(reporter.stages_failed(), 1);
        assert!(!reporter.finish());

        let text = output(reporter);
        assert!(text.starts_with("TAP version 14\n1..3\n"));
        assert!(text.contains("ok 1 - first\n"));
        assert!(text.contains("not ok 2 - second\n# broken\n"));
        assert!(text.contains("ok 3 - third # SKIP not reached\n"));
        assert!(text.contains("# Skipped: 1\n"));
        assert!(text.ends_with("# Result: FAIL\n"));
    }

    #[test]
    fn test_reporter_all_pass() {
        let mut reporter = TapReporter::new(Vec::new());
        assert!(reporter.check("only", true, "unused"));
        assert!(reporter.finish());
        assert!(output(reporter).ends_with("# Result: PASS\n"));
    }

    #[test]
    fn test_run_records_error() {
        let mut reporter = TapReporter::new(Vec::new());
        let passed = reporter.run("parse", || {
            let _: i32 = "nope".parse()?;
            Ok(())
        });
        assert!(!passed);
        let text = output(reporter);
        assert!(text.contains("not ok 1 - parse\n# Error: "));
    }

    #[test]
    fn test_run_catches_panic() {
        let mut reporter = TapReporter::new(Vec::new());
        let passed = reporter.run("explodes", || panic!("boom"));
        assert!(!passed);
        assert!(output(reporter).contains("# Panic: boom"));
    }
}
