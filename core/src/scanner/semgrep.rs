//! Semgrep - 通用多语言代码扫描
//!
//! Semgrep 未登录时不会返回代码片段（`extra.lines` 为 `"requires login"`），
//! 此时直接从磁盘读取报告行附近的源码作为上下文。

use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::runner::CommandLine;
use super::{array_field, field_text, parse_json, ScanContext, Scanner};
use crate::error::Result;
use crate::model::Vulnerability;

const SNIPPET_HIDDEN: &str = "requires login";

pub struct Semgrep;

impl Semgrep {
    fn needs_snippet_fallback(lines: &str) -> bool {
        let trimmed = lines.trim();
        trimmed.is_empty() || trimmed == SNIPPET_HIDDEN
    }

    fn locate_source(reported: &str, ctx: &ScanContext) -> Option<PathBuf> {
        let direct = PathBuf::from(reported);
        if direct.is_file() {
            return Some(direct);
        }
        let joined = ctx.root.join(ctx.normalize(reported));
        joined.is_file().then_some(joined)
    }

    /// 读取 [line - before, line + after] 范围内的源码，超出文件的行被跳过
    fn read_context(path: &Path, line: usize, before: usize, after: usize) -> String {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Could not read {} for context: {}", path.display(), e);
                return String::new();
            }
        };
        let lines: Vec<&str> = content.lines().collect();

        let mut code = String::new();
        let start = line.saturating_sub(before).max(1);
        let end = line.saturating_add(after).min(lines.len());
        for line_no in start..=end {
            if let Some(text) = lines.get(line_no - 1) {
                let _ = writeln!(code, "{} {}", line_no, text);
            }
        }
        code
    }

    fn code_context(issue: &Value, ctx: &ScanContext) -> String {
        let extra = &issue["extra"];
        let lines = field_text(extra, "lines");
        if !Self::needs_snippet_fallback(&lines) {
            return lines;
        }

        let Some(line) = issue["start"]["line"]
            .as_u64()
            .and_then(|line| usize::try_from(line).ok())
        else {
            return String::new();
        };
        match Self::locate_source(&field_text(issue, "path"), ctx) {
            Some(path) => Self::read_context(&path, line, ctx.snippet_before, ctx.snippet_after),
            None => String::new(),
        }
    }
}

impl Scanner for Semgrep {
    fn id(&self) -> &'static str {
        "semgrep"
    }

    fn name(&self) -> &'static str {
        "Semgrep"
    }

    fn language(&self) -> &'static str {
        "Generic (Non-Commercial)"
    }

    fn short_description(&self) -> &'static str {
        "A generic code scanner for all languages."
    }

    fn build_command(&self, ctx: &ScanContext) -> CommandLine {
        CommandLine::new("semgrep").args([
            "scan",
            "--json",
            "-q",
            "--no-git-ignore",
            "--config",
            "auto",
            &ctx.root_str(),
        ])
    }

    fn version_command(&self) -> Option<CommandLine> {
        Some(CommandLine::new("semgrep").arg("--version"))
    }

    fn parse(&self, raw: &[u8], ctx: &ScanContext) -> Result<Vec<Vulnerability>> {
        let Some(output) = parse_json(raw)? else {
            return Ok(Vec::new());
        };

        let mut vulns = Vec::new();
        for issue in array_field(&output, "results") {
            let extra = &issue["extra"];
            let metadata = &extra["metadata"];

            let mut vuln = ctx.vulnerability(field_text(issue, "check_id"));
            vuln.description = field_text(extra, "message");
            vuln.code_file = ctx.normalize(&field_text(issue, "path"));
            vuln.code_line = field_text(&issue["start"], "line");
            vuln.code_context = Self::code_context(issue, ctx);
            vuln.severity = field_text(extra, "severity");
            vuln.confidence = field_text(metadata, "confidence");
            vuln.impact = field_text(metadata, "impact");
            vuln.likelihood = field_text(metadata, "likelihood");
            vuln.found_by = self.id().to_string();
            vuln.extra_metadata = issue.clone();
            vulns.push(vuln);
        }

        Ok(vulns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(root: &Path) -> ScanContext {
        ScanContext {
            project: Uuid::new_v4(),
            scan: Uuid::new_v4(),
            root: root.to_path_buf(),
            snippet_before: 2,
            snippet_after: 4,
        }
    }

    fn output(path: &str, lines: &str) -> String {
        serde_json::json!({
            "errors": [],
            "results": [{
                "check_id": "python.lang.security.audit.eval-detected",
                "path": path,
                "start": {"line": 3, "col": 1, "offset": 20},
                "extra": {
                    "lines": lines,
                    "message": "Detected the use of eval().",
                    "severity": "WARNING",
                    "metadata": {
                        "confidence": "LOW",
                        "impact": "HIGH",
                        "likelihood": "MEDIUM",
                        "cwe": ["CWE-95"]
                    }
                }
            }]
        })
        .to_string()
    }

    #[test]
    fn pulls_classifications_from_metadata() {
        let root = PathBuf::from("/srv/.projects/demo");
        let raw = output("/srv/.projects/demo/app.py", "eval(x)");
        let vulns = Semgrep.parse(raw.as_bytes(), &ctx(&root)).unwrap();

        assert_eq!(vulns.len(), 1);
        let v = &vulns[0];
        assert_eq!(v.title, "python.lang.security.audit.eval-detected");
        assert_eq!(v.description, "Detected the use of eval().");
        assert_eq!(v.severity, "WARNING");
        assert_eq!(v.confidence, "LOW");
        assert_eq!(v.impact, "HIGH");
        assert_eq!(v.likelihood, "MEDIUM");
        assert_eq!(v.code_file, "app.py");
        assert_eq!(v.code_line, "3");
        assert_eq!(v.code_context, "eval(x)");
        assert_eq!(v.found_by, "semgrep");
    }

    #[test]
    fn reads_context_from_disk_when_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.py");
        let source: String = (1..=10).map(|n| format!("line{}\n", n)).collect();
        std::fs::write(&file, source).unwrap();

        let raw = output(&file.to_string_lossy(), "requires login");
        let vulns = Semgrep.parse(raw.as_bytes(), &ctx(dir.path())).unwrap();

        assert_eq!(
            vulns[0].code_context,
            "1 line1\n2 line2\n3 line3\n4 line4\n5 line5\n6 line6\n7 line7\n"
        );
        assert_eq!(vulns[0].code_file, "app.py");
    }

    #[test]
    fn context_window_stops_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("short.py");
        std::fs::write(&file, "a\nb\nc\nd\n").unwrap();
        let code = Semgrep::read_context(&file, 3, 2, 4);
        assert_eq!(code, "1 a\n2 b\n3 c\n4 d\n");
    }

    #[test]
    fn out_of_range_line_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.py");
        std::fs::write(&file, "a\nb\nc\n").unwrap();

        let raw = serde_json::json!({
            "results": [{
                "check_id": "x",
                "path": file.to_string_lossy(),
                "start": {"line": u64::MAX},
                "extra": {"lines": "requires login"}
            }]
        })
        .to_string();
        let vulns = Semgrep.parse(raw.as_bytes(), &ctx(dir.path())).unwrap();
        assert_eq!(vulns[0].code_context, "");
        assert_eq!(vulns[0].code_line, u64::MAX.to_string());

        assert_eq!(Semgrep::read_context(&file, usize::MAX, 2, 4), "");
    }

    #[test]
    fn missing_source_file_yields_empty_context() {
        let root = PathBuf::from("/nonexistent/root");
        let raw = output("/nonexistent/root/gone.py", "");
        let vulns = Semgrep.parse(raw.as_bytes(), &ctx(&root)).unwrap();
        assert_eq!(vulns[0].code_context, "");
    }

    #[test]
    fn missing_metadata_defaults_to_empty() {
        let raw = br#"{"results": [{"check_id": "x", "path": "a.py", "start": {"line": 1}, "extra": {"lines": "x"}}]}"#;
        let vulns = Semgrep.parse(raw, &ctx(Path::new("/r"))).unwrap();
        assert_eq!(vulns[0].confidence, "");
        assert_eq!(vulns[0].impact, "");
        assert_eq!(vulns[0].likelihood, "");
        assert_eq!(vulns[0].severity, "");
    }

    #[test]
    fn empty_results() {
        let vulns = Semgrep
            .parse(br#"{"results": [], "errors": []}"#, &ctx(Path::new("/r")))
            .unwrap();
        assert!(vulns.is_empty());
    }

    #[test]
    fn version_uses_first_line() {
        assert_eq!(Semgrep.format_version(b"1.50.0\nextra\n"), "Semgrep 1.50.0");
    }
}
