use super::runner::CommandLine;
use super::{array_field, field_text, parse_json, ScanContext, Scanner};
use crate::error::Result;
use crate::model::Vulnerability;

/// GoSec - 基于 Go AST/SSA 的安全检查
pub struct GoSec;

impl Scanner for GoSec {
    fn id(&self) -> &'static str {
        "gosec"
    }

    fn name(&self) -> &'static str {
        "GoSec"
    }

    fn language(&self) -> &'static str {
        "Go"
    }

    fn short_description(&self) -> &'static str {
        "Inspects source code for security problems by scanning the Go AST and SSA code representation."
    }

    fn build_command(&self, ctx: &ScanContext) -> CommandLine {
        CommandLine::new("gosec").args([
            "-fmt",
            "json",
            "-quiet",
            &format!("{}/./...", ctx.root_str()),
        ])
    }

    fn version_command(&self) -> Option<CommandLine> {
        Some(CommandLine::new("gosec").arg("-version"))
    }

    fn format_version(&self, raw: &[u8]) -> String {
        // 输出形如 "Version: 2.18.2\nGit tag: ..."
        let raw = String::from_utf8_lossy(raw);
        let version = raw
            .lines()
            .find_map(|l| l.trim().strip_prefix("Version:"))
            .or_else(|| raw.lines().next())
            .unwrap_or("")
            .trim();
        format!("{} {}", self.name(), version)
    }

    fn parse(&self, raw: &[u8], ctx: &ScanContext) -> Result<Vec<Vulnerability>> {
        let Some(output) = parse_json(raw)? else {
            return Ok(Vec::new());
        };

        let mut vulns = Vec::new();
        for issue in array_field(&output, "Issues") {
            let details = field_text(issue, "details");
            let mut vuln = ctx.vulnerability(details.clone());
            vuln.description = details;
            vuln.code_file = ctx.normalize(&field_text(issue, "file"));
            // 可能是 "12-14" 这样的范围，原样保存
            vuln.code_line = field_text(issue, "line");
            vuln.code_context = field_text(issue, "code");
            vuln.severity = field_text(issue, "severity");
            vuln.confidence = field_text(issue, "confidence");
            vuln.found_by = self.id().to_string();
            vuln.extra_metadata = issue.clone();
            vulns.push(vuln);
        }

        Ok(vulns)
    }
}
