//! Device Log Pipeline
//!
//! Parses raw logcat lines into `(content, include)` pairs and owns
//! the follow-mode logcat subprocess while a launch session streams.
//!
//! In tag format every line looks like `I/some.tag: message`, possibly
//! wrapped in ANSI color sequences on both sides. Only lines tagged
//! with the app's own stdout/stderr sentinels are shown to the user;
//! everything else is platform noise.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tracing::debug;

use crate::channel::LogSource;

/// Log tag carrying the app's standard output.
pub const STDOUT_TAG: &str = "python.stdout";
/// Log tag carrying the app's standard error.
pub const STDERR_TAG: &str = "python.stderr";

/// A single ANSI escape sequence (CSI or two-byte form).
const ANSI_ESCAPE: &str = r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])";

/// Tag-format log prefix: optional color codes, a priority letter,
/// `/tag: `, then content running up to the first trailing escape.
static LOG_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "^(?:{ANSI_ESCAPE})*[A-Z]/(?P<tag>.*?): (?P<content>[^\x1B]*)"
    ))
    .expect("log prefix pattern should compile")
});

/// Splits raw device log lines into app output and platform noise.
#[derive(Debug, Clone)]
pub struct LogClassifier {
    sentinel_tags: HashSet<String>,
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new([STDOUT_TAG, STDERR_TAG])
    }
}

impl LogClassifier {
    /// Build a classifier with custom sentinel tags.
    pub fn new<I, T>(sentinel_tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            sentinel_tags: sentinel_tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify one raw log line.
    ///
    /// Returns the cleaned content and whether it belongs to the app's
    /// own output streams. Lines that do not look like tagged log
    /// records pass through unchanged with `include = false`; this
    /// never fails on arbitrary input.
    pub fn classify<'a>(&self, line: &'a str) -> (&'a str, bool) {
        match LOG_LINE_RE.captures(line) {
            Some(caps) => {
                let tag = caps.name("tag").map_or("", |m| m.as_str());
                let content = caps.name("content").map_or("", |m| m.as_str());
                (content, self.sentinel_tags.contains(tag))
            }
            None => (line, false),
        }
    }
}

/// A running follow-mode logcat subprocess, read line by line.
pub struct LogStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl LogStream {
    pub(crate) fn from_child(mut child: Child) -> std::io::Result<Self> {
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "log stream has no stdout pipe")
        })?;
        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
        })
    }
}

impl LogSource for LogStream {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    async fn terminate(&mut self) {
        if let Err(err) = self.child.kill().await {
            debug!("logcat process already finished: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_stdout_is_included() {
        let classifier = LogClassifier::default();
        assert_eq!(
            classifier.classify("I/python.stdout: Hello, World!"),
            ("Hello, World!", true)
        );
    }

    #[test]
    fn app_stderr_is_included_at_any_priority() {
        let classifier = LogClassifier::default();
        assert_eq!(
            classifier.classify("W/python.stderr: Traceback (most recent call last):"),
            ("Traceback (most recent call last):", true)
        );
        assert_eq!(
            classifier.classify("E/python.stderr:   File \"app.py\", line 1"),
            ("  File \"app.py\", line 1", true)
        );
    }

    #[test]
    fn platform_tags_are_cleaned_but_excluded() {
        let classifier = LogClassifier::default();
        assert_eq!(
            classifier.classify("D/EGL_emulation: eglMakeCurrent: 0x7f5a"),
            ("eglMakeCurrent: 0x7f5a", false)
        );
    }

    #[test]
    fn ansi_wrapping_is_stripped() {
        let classifier = LogClassifier::default();
        assert_eq!(
            classifier.classify("\x1b[32mI/python.stdout: colored\x1b[0m"),
            ("colored", true)
        );
        assert_eq!(
            classifier.classify("\x1b[1m\x1b[32mI/python.stderr: double wrapped\x1b[0m\x1b[39m"),
            ("double wrapped", true)
        );
    }

    #[test]
    fn content_stops_at_first_interior_escape() {
        let classifier = LogClassifier::default();
        assert_eq!(
            classifier.classify("I/python.stdout: before\x1b[31mafter"),
            ("before", true)
        );
    }

    #[test]
    fn empty_content_is_preserved() {
        let classifier = LogClassifier::default();
        assert_eq!(classifier.classify("I/python.stdout: "), ("", true));
    }

    #[test]
    fn malformed_lines_pass_through_unchanged() {
        let classifier = LogClassifier::default();
        let cases = [
            "--------- beginning of main",
            "not a log line",
            "I/missing.space:nope",
            "i/lowercase.level: nope",
            "",
        ];
        for line in cases {
            assert_eq!(classifier.classify(line), (line, false));
        }
    }

    #[test]
    fn passthrough_output_is_a_fixed_point() {
        let classifier = LogClassifier::default();
        let (first, included) = classifier.classify("plain crash text");
        assert!(!included);
        assert_eq!(classifier.classify(first), (first, false));
    }

    #[test]
    fn shortest_tag_wins_when_content_contains_separators() {
        let classifier = LogClassifier::default();
        assert_eq!(
            classifier.classify("I/python.stdout: key: value"),
            ("key: value", true)
        );
    }

    #[test]
    fn custom_sentinels_replace_the_defaults() {
        let classifier = LogClassifier::new(["app.out"]);
        assert_eq!(classifier.classify("I/app.out: hi"), ("hi", true));
        assert_eq!(classifier.classify("I/python.stdout: hi"), ("hi", false));
    }
}
