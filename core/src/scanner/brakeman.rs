use serde_json::Value;

use super::runner::CommandLine;
use super::{array_field, field_text, parse_json, ScanContext, Scanner};
use crate::error::Result;
use crate::model::Vulnerability;

const IGNORED_PREFIX: &str = "*Brakeman disclosed this as an ignored warning.*\n";

/// Brakeman - Ruby on Rails 安全静态分析
pub struct Brakeman;

impl Brakeman {
    fn convert(&self, issue: &Value, ctx: &ScanContext, ignored: bool) -> Vulnerability {
        let message = field_text(issue, "message");
        let mut vuln = ctx.vulnerability(field_text(issue, "warning_type"));
        vuln.description = if ignored {
            format!("{}{}", IGNORED_PREFIX, message)
        } else {
            message
        };
        vuln.code_file = ctx.normalize(&field_text(issue, "file"));
        vuln.code_line = field_text(issue, "line");
        vuln.code_context = field_text(issue, "code");
        vuln.confidence = field_text(issue, "confidence");
        vuln.found_by = self.id().to_string();
        vuln.extra_metadata = issue.clone();
        vuln
    }
}

impl Scanner for Brakeman {
    fn id(&self) -> &'static str {
        "brakeman"
    }

    fn name(&self) -> &'static str {
        "Brakeman"
    }

    fn language(&self) -> &'static str {
        "Ruby"
    }

    fn short_description(&self) -> &'static str {
        "Security oriented static analyser for ruby code."
    }

    fn build_command(&self, ctx: &ScanContext) -> CommandLine {
        CommandLine::new("brakeman").args([
            "-f",
            "json",
            "--no-exit-on-warn",
            "--no-exit-on-error",
            "-A",
            "--force",
            &ctx.root_str(),
        ])
    }

    fn version_command(&self) -> Option<CommandLine> {
        Some(CommandLine::new("brakeman").arg("--version"))
    }

    fn format_version(&self, raw: &[u8]) -> String {
        let raw = String::from_utf8_lossy(raw);
        let first = raw.lines().next().unwrap_or("").trim();
        let version = first.strip_prefix("brakeman").unwrap_or(first).trim();
        format!("{} {}", self.name(), version)
    }

    fn parse(&self, raw: &[u8], ctx: &ScanContext) -> Result<Vec<Vulnerability>> {
        let Some(output) = parse_json(raw)? else {
            return Ok(Vec::new());
        };

        let warnings = array_field(&output, "warnings")
            .iter()
            .map(|issue| self.convert(issue, ctx, false));
        let ignored = array_field(&output, "ignored_warnings")
            .iter()
            .map(|issue| self.convert(issue, ctx, true));

        Ok(warnings.chain(ignored).collect())
    }
}
