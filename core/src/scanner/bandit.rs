//! Bandit - Python 安全静态分析

use serde_json::Value;

use super::runner::CommandLine;
use super::{array_field, field_text, parse_json, ScanContext, Scanner};
use crate::error::Result;
use crate::model::Vulnerability;

pub struct Bandit;

impl Bandit {
    fn line_of(issue: &Value) -> String {
        let line = field_text(issue, "line_number");
        if !line.is_empty() {
            return line;
        }
        // 没有 line_number 时退回 line_range
        let range: Vec<String> = array_field(issue, "line_range")
            .iter()
            .filter_map(Value::as_i64)
            .map(|n| n.to_string())
            .collect();
        match range.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [first, .., last] => format!("{}-{}", first, last),
        }
    }
}

impl Scanner for Bandit {
    fn id(&self) -> &'static str {
        "bandit"
    }

    fn name(&self) -> &'static str {
        "Bandit (Python)"
    }

    fn language(&self) -> &'static str {
        "Python"
    }

    fn short_description(&self) -> &'static str {
        "Security oriented static analyser for python code."
    }

    fn build_command(&self, ctx: &ScanContext) -> CommandLine {
        CommandLine::new("bandit").args(["-r", &ctx.root_str(), "-f", "json", "-q"])
    }

    fn version_command(&self) -> Option<CommandLine> {
        Some(CommandLine::new("bandit").arg("--version"))
    }

    fn format_version(&self, raw: &[u8]) -> String {
        let raw = String::from_utf8_lossy(raw);
        let first = raw.lines().next().unwrap_or("").trim();
        let version = first.strip_prefix("bandit").unwrap_or(first).trim();
        format!("Bandit {}", version)
    }

    fn parse(&self, raw: &[u8], ctx: &ScanContext) -> Result<Vec<Vulnerability>> {
        let Some(output) = parse_json(raw)? else {
            return Ok(Vec::new());
        };

        let mut vulns = Vec::new();
        for issue in array_field(&output, "results") {
            let mut vuln = ctx.vulnerability(format!(
                "{}:{}",
                field_text(issue, "test_id"),
                field_text(issue, "test_name")
            ));
            vuln.description = field_text(issue, "issue_text");
            vuln.severity = field_text(issue, "issue_severity");
            vuln.confidence = field_text(issue, "issue_confidence");
            vuln.code_file = ctx.normalize(&field_text(issue, "filename"));
            vuln.code_line = Self::line_of(issue);
            vuln.code_context = field_text(issue, "code");
            vuln.found_by = self.id().to_string();
            vuln.extra_metadata = issue.clone();
            vulns.push(vuln);
        }

        Ok(vulns)
    }
}
