// Scanner module - 扫描器模块
// 定义外部分析工具适配器的核心接口和类型

pub mod bandit;
pub mod brakeman;
pub mod gosec;
pub mod registry;
pub mod runner;
pub mod semgrep;

use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::HermesConfig;
use crate::error::Result;
use crate::model::{Project, Scan, Vulnerability};
use runner::CommandLine;

/// 一次适配器调用所需的上下文
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub project: Uuid,
    pub scan: Uuid,
    /// 项目源码的绝对根路径
    pub root: PathBuf,
    pub snippet_before: usize,
    pub snippet_after: usize,
}

impl ScanContext {
    pub fn new(project: &Project, scan: &Scan, config: &HermesConfig) -> Self {
        Self {
            project: project.id,
            scan: scan.id,
            root: project.scanner_path(config),
            snippet_before: config.snippet_context_before,
            snippet_after: config.snippet_context_after,
        }
    }

    pub fn root_str(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    pub fn normalize(&self, file_path: &str) -> String {
        normalize_finding_path(&self.root_str(), file_path)
    }

    /// 创建挂在当前扫描下的漏洞记录
    pub fn vulnerability(&self, title: impl Into<String>) -> Vulnerability {
        Vulnerability::new(self.scan, self.project, title)
    }
}

/// 扫描器 trait - 所有外部工具适配器都需要实现此接口
pub trait Scanner: Send + Sync {
    /// 注册表中的唯一 id（小写）
    fn id(&self) -> &'static str;

    /// 展示名称
    fn name(&self) -> &'static str;

    /// 目标语言/生态，仅用于展示
    fn language(&self) -> &'static str;

    fn short_description(&self) -> &'static str;

    /// 生成命令行，不执行任何操作
    fn build_command(&self, ctx: &ScanContext) -> CommandLine;

    /// 退出码 1 表示“运行完成且有发现”
    fn accepts_exit_code(&self, code: i32) -> bool {
        code == 0 || code == 1
    }

    fn version_command(&self) -> Option<CommandLine> {
        None
    }

    fn format_version(&self, raw: &[u8]) -> String {
        let raw = String::from_utf8_lossy(raw);
        let first = raw.lines().next().unwrap_or("").trim();
        format!("{} {}", self.name(), first)
    }

    /// 将工具原始输出解析为漏洞记录
    fn parse(&self, raw: &[u8], ctx: &ScanContext) -> Result<Vec<Vulnerability>>;
}

/// 去掉工具报告路径中的扫描根目录
///
/// 先去掉 `root/` 前缀；如果 root 仍出现在路径中（工具给出了另一种绝对路径），
/// 在首次出现处切开并去掉开头的分隔符。
pub fn normalize_finding_path(root: &str, file_path: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return file_path.to_string();
    }

    let prefix = format!("{}/", root);
    let mut output = file_path.strip_prefix(&prefix).unwrap_or(file_path);

    while let Some(idx) = output.find(root) {
        output = output[idx + root.len()..].trim_start_matches('/');
    }

    output.to_string()
}

/// 读取文本字段，数字会被转成字符串，缺失时返回空串
pub(crate) fn field_text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// 取顶层数组，缺失或为 null 时视为空
pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// 解析 JSON 输出；空输出视为没有发现
pub(crate) fn parse_json(raw: &[u8]) -> Result<Option<Value>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(raw)?))
}
