use std::fs;
use std::io;
use std::path::Path;

pub const REPORT_TITLE: &str = "JVM Diagnostics Report";
pub const FOOTER: &str = "*Generated by jfrscope*";

/// Markdown report with `findings` embedded verbatim (no escaping).
pub fn render_report(findings: &str) -> String {
    format!("\n# {REPORT_TITLE}\n\n## Executive Summary\n\n{findings}\n\n---\n\n{FOOTER}\n")
}

pub fn write_report(findings: &str, destination: &Path) -> io::Result<()> {
    fs::write(destination, render_report(findings))
}
