// 数据模型：项目、扫描、漏洞、通知与自动化记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::HermesConfig;
use crate::error::CoreError;
use crate::scanner::normalize_finding_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 相对于 project_dir 的源码目录
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub is_git_based: bool,
    /// 有序的扫描器 id 列表，可能包含已下线的 id
    #[serde(default)]
    pub code_scanners: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub other_users: Vec<i64>,
}

impl Project {
    pub fn new(owner: i64, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            created_at: Utc::now(),
            title: title.into(),
            description: String::new(),
            directory: String::new(),
            is_git_based: false,
            code_scanners: Vec::new(),
            is_public: false,
            other_users: Vec::new(),
        }
    }

    pub fn with_scanners<I, S>(mut self, scanners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.code_scanners = scanners.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn git_based(mut self, is_git_based: bool) -> Self {
        self.is_git_based = is_git_based;
        self
    }

    /// 源码目录必须是 PROJECT_DIR 之下的相对路径
    pub fn check_directory(directory: &str) -> Result<(), CoreError> {
        let path = Path::new(directory);
        let contained = !directory.trim().is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        if contained {
            Ok(())
        } else {
            Err(CoreError::Precondition(format!(
                "directory must be relative to the project root: {:?}",
                directory
            )))
        }
    }

    /// 扫描器的输入路径
    pub fn scanner_path(&self, config: &HermesConfig) -> PathBuf {
        config.project_dir.join(&self.directory)
    }

    /// 去掉发现结果中的暂存目录前缀
    pub fn normalize_finding_path(&self, config: &HermesConfig, file_path: &str) -> String {
        let root = self.scanner_path(config);
        normalize_finding_path(&root.to_string_lossy(), file_path)
    }

    pub fn short_description(&self) -> String {
        if self.description.chars().count() > 47 {
            let head: String = self.description.chars().take(47).collect();
            format!("{}...", head)
        } else {
            self.description.clone()
        }
    }

    /// 用户是否可以查看此项目
    pub fn is_visible_to(&self, user_id: i64) -> bool {
        self.owner == user_id || self.is_public || self.other_users.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub project: Uuid,
    /// 项目内单调递增的扫描序号，从 1 开始
    pub number: i64,
    #[serde(default)]
    pub scanner_versions_used: Vec<String>,
}

impl Scan {
    pub fn new(project: Uuid, number: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            project,
            number,
            scanner_versions_used: Vec::new(),
        }
    }

    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn scanner_versions(&self) -> String {
        if self.scanner_versions_used.is_empty() {
            return "Unknown".to_string();
        }
        self.scanner_versions_used.join(", ")
    }
}

/// 单条归一化后的漏洞发现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scan: Uuid,
    pub project: Uuid,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub confidence: String,
    pub impact: String,
    pub likelihood: String,
    /// 相对于项目根目录的路径
    pub code_file: String,
    /// 行号文本，部分工具会给出范围
    pub code_line: String,
    pub code_context: String,
    pub found_by: String,
    pub extra_metadata: serde_json::Value,
    // 以下字段由审阅界面修改
    pub state: String,
    pub exploitability: String,
    pub notes: String,
}

impl Vulnerability {
    pub fn new(scan: Uuid, project: Uuid, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            scan,
            project,
            title: title.into(),
            description: String::new(),
            severity: String::new(),
            confidence: String::new(),
            impact: String::new(),
            likelihood: String::new(),
            code_file: String::new(),
            code_line: String::new(),
            code_context: String::new(),
            found_by: "Unknown".to_string(),
            extra_metadata: serde_json::Value::Object(Default::default()),
            state: "New".to_string(),
            exploitability: "Unknown".to_string(),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
            NotificationLevel::Success => "success",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(NotificationLevel::Info),
            "warning" => Ok(NotificationLevel::Warning),
            "error" => Ok(NotificationLevel::Error),
            "success" => Ok(NotificationLevel::Success),
            other => Err(CoreError::Parse(format!(
                "unknown notification level: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub target: i64,
    pub message: String,
    pub level: NotificationLevel,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(target: i64, message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            message: message.into(),
            level,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAutomation {
    pub id: Uuid,
    pub project: Uuid,
    /// 扫描间隔（秒）
    pub scan_interval: Option<i64>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    /// 拉取间隔（秒）
    pub pull_interval: Option<i64>,
    pub last_pulled_at: Option<DateTime<Utc>>,
}

impl ProjectAutomation {
    pub fn new(project: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            project,
            scan_interval: None,
            last_scanned_at: None,
            pull_interval: None,
            last_pulled_at: None,
        }
    }
}
