// Run Reporter
// Generates matrix run reports in terminal, JSON, JUnit XML, and TAP formats

use crate::error::{ServiceError, ServiceResult};
use crate::parser::models::{CommandStatus, JobResult, RunSummary};

use std::fmt;
use std::path::Path;

/// Output format for run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable terminal output
    Terminal,
    /// Machine-readable JSON
    Json,
    /// JUnit XML format (for CI systems)
    JUnit,
    /// TAP (Test Anything Protocol) format
    Tap,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Terminal => write!(f, "terminal"),
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::JUnit => write!(f, "junit"),
            ReportFormat::Tap => write!(f, "tap"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminal" | "text" | "console" => Ok(ReportFormat::Terminal),
            "json" => Ok(ReportFormat::Json),
            "junit" | "junit-xml" | "xml" => Ok(ReportFormat::JUnit),
            "tap" => Ok(ReportFormat::Tap),
            _ => Err(format!(
                "Unknown report format '{}'. Valid formats: terminal, json, junit, tap",
                s
            )),
        }
    }
}

/// Reporter turning a run summary into text
pub struct RunReporter;

impl RunReporter {
    /// Generate a report in the specified format
    pub fn report(summary: &RunSummary, format: ReportFormat) -> ServiceResult<String> {
        match format {
            ReportFormat::Terminal => Ok(Self::to_terminal(summary)),
            ReportFormat::Json => Self::to_json(summary),
            ReportFormat::JUnit => Ok(Self::to_junit_xml(summary)),
            ReportFormat::Tap => Ok(Self::to_tap(summary)),
        }
    }

    /// Generate a report and write it to `path`
    pub fn write(summary: &RunSummary, format: ReportFormat, path: &Path) -> ServiceResult<()> {
        let report = Self::report(summary, format)?;
        std::fs::write(path, report)
            .map_err(|e| ServiceError::Report(format!("{}: {}", path.display(), e)))
    }

    pub fn to_json(summary: &RunSummary) -> ServiceResult<String> {
        serde_json::to_string_pretty(summary).map_err(|e| ServiceError::Report(e.to_string()))
    }

    /// Generate JUnit XML output, one testcase per job
    pub fn to_junit_xml(summary: &RunSummary) -> String {
        let total = summary.results.len();
        let failures = total - summary.passed();
        let secs = summary.duration.as_secs_f64();

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuites tests=\"{}\" failures=\"{}\" errors=\"0\" time=\"{:.3}\">\n",
            total, failures, secs
        ));
        xml.push_str(&format!(
            "  <testsuite name=\"build matrix\" tests=\"{}\" failures=\"{}\" errors=\"0\" time=\"{:.3}\">\n",
            total, failures, secs
        ));

        for result in &summary.results {
            xml.push_str(&format!(
                "    <testcase name=\"{}\" classname=\"job-{}\" time=\"{:.3}\"",
                xml_escape(&result.job.label()),
                result.number,
                result.duration.as_secs_f64()
            ));

            if result.passed() {
                xml.push_str(" />\n");
                continue;
            }

            xml.push_str(">\n");
            xml.push_str(&format!(
                "      <failure message=\"{}\">\n",
                xml_escape(&failure_message(result))
            ));
            if let Some(command) = result.failing_command() {
                xml.push_str(&format!("$ {}\n", xml_escape(&command.command)));
                for block in [&command.stdout, &command.stderr] {
                    if !block.is_empty() {
                        xml.push_str(&xml_escape(block));
                        xml.push('\n');
                    }
                }
            }
            xml.push_str("      </failure>\n");
            xml.push_str("    </testcase>\n");
        }

        xml.push_str("  </testsuite>\n");
        xml.push_str("</testsuites>\n");
        xml
    }

    /// Generate TAP version 13 output
    pub fn to_tap(summary: &RunSummary) -> String {
        let mut tap = String::new();
        tap.push_str("TAP version 13\n");
        tap.push_str(&format!("1..{}\n", summary.results.len()));

        for result in &summary.results {
            let label = result.job.label();
            if result.passed() {
                tap.push_str(&format!("ok {} - {}\n", result.number, label));
                continue;
            }

            // TAP TODO directive: the plan still passes
            let directive = if result.allow_failure {
                " # TODO allowed failure"
            } else {
                ""
            };
            tap.push_str(&format!("not ok {} - {}{}\n", result.number, label, directive));
            tap.push_str("  ---\n");
            tap.push_str(&format!("  duration_ms: {}\n", result.duration.as_millis()));
            tap.push_str(&format!("  exit_code: {}\n", result.exit_code));
            tap.push_str(&format!("  phase: {}\n", result.phase_reached));
            if let Some(command) = result.failing_command() {
                tap.push_str(&format!("  command: \"{}\"\n", tap_escape(&command.command)));
            }
            tap.push_str("  ...\n");
        }

        tap.push_str(&format!(
            "# jobs {}\n# pass {}\n# fail {}\n# duration {:.3}s\n",
            summary.results.len(),
            summary.passed(),
            summary.failed(),
            summary.duration.as_secs_f64()
        ));
        tap
    }

    /// Generate human-readable terminal output
    pub fn to_terminal(summary: &RunSummary) -> String {
        let mut out = String::new();

        out.push_str("\nBuild Matrix\n");
        out.push_str(&"=".repeat(60));
        out.push('\n');

        for result in &summary.results {
            let (symbol, status) = match (result.passed(), result.allow_failure) {
                (true, _) => ("+", "PASS"),
                (false, true) => ("~", "FAIL (allowed)"),
                (false, false) => ("x", "FAIL"),
            };

            out.push_str(&format!(
                "  [{}] {} #{} ({:.2}s) {}\n",
                symbol,
                status,
                result.number,
                result.duration.as_secs_f64(),
                result.job.label(),
            ));

            if !result.passed() {
                out.push_str(&format!("       {}\n", failure_message(result)));
            }

            let skipped = result
                .commands
                .iter()
                .filter(|c| c.status == CommandStatus::Skipped)
                .count();
            if skipped > 0 {
                out.push_str(&format!("       {} command(s) skipped\n", skipped));
            }
        }

        out.push_str(&"-".repeat(60));
        out.push('\n');

        let total = summary.results.len();
        let secs = summary.duration.as_secs_f64();
        let status_line = if summary.success && summary.passed() == total {
            format!("  All {} jobs passed ({:.2}s)", total, secs)
        } else if summary.success {
            format!(
                "  {} of {} jobs passed, {} allowed to fail ({:.2}s)",
                summary.passed(),
                total,
                summary.allowed_failures(),
                secs
            )
        } else {
            format!("  {} of {} jobs failed ({:.2}s)", summary.failed(), total, secs)
        };
        out.push_str(&status_line);
        out.push('\n');
        out.push('\n');
        out
    }
}

/// `<kind> in <phase> (exit code N): <command>`
pub fn failure_message(result: &JobResult) -> String {
    let kind = result
        .failure
        .map(|f| f.to_string())
        .unwrap_or_else(|| "failure".to_string());
    let mut message = format!(
        "{} in {} (exit code {})",
        kind, result.phase_reached, result.exit_code
    );
    if let Some(command) = result.failing_command() {
        message.push_str(": ");
        message.push_str(&command.command);
    }
    message
}

/// Escape special XML characters
///
/// ANSI color sequences are removed and characters XML 1.0 cannot carry are
/// dropped, so captured terminal output stays well-formed.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => {
                // CSI: parameters and intermediates up to a final byte in '@'..='~'
                if chars.peek() == Some(&'[') {
                    chars.next();
                    for ch in chars.by_ref() {
                        if ('@'..='~').contains(&ch) {
                            break;
                        }
                    }
                }
            }
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{d7ff}'
        | '\u{e000}'..='\u{fffd}'
        | '\u{10000}'..='\u{10ffff}')
}

/// Escape a YAML double-quoted scalar so it stays on one line
fn tap_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
