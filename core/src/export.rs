// 扫描导出：生成可重新导入的归档文档

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Project, Scan, User, Vulnerability};
use crate::store::Store;

/// 归档中出现的用户联系信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&User> for ArchiveUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        }
    }
}

/// 不含源码目录和协作者的项目信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedProject {
    pub code_scanners: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub id: Uuid,
    pub is_git_based: bool,
    pub is_public: bool,
    pub owner: ArchiveUser,
    pub title: String,
}

impl ArchivedProject {
    fn new(project: &Project, owner: &User) -> Self {
        Self {
            code_scanners: project.code_scanners.clone(),
            created_at: project.created_at,
            description: project.description.clone(),
            id: project.id,
            is_git_based: project.is_git_based,
            is_public: project.is_public,
            owner: ArchiveUser::from(owner),
            title: project.title.clone(),
        }
    }
}

/// 不含 project/scan 外键的漏洞
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedVulnerability {
    pub code_context: String,
    pub code_file: String,
    pub code_line: String,
    pub confidence: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub exploitability: String,
    /// JSON 文本
    pub extra_metadata: String,
    pub found_by: String,
    pub id: Uuid,
    pub impact: String,
    pub likelihood: String,
    pub notes: String,
    pub severity: String,
    pub state: String,
    pub title: String,
}

impl From<&Vulnerability> for ArchivedVulnerability {
    fn from(v: &Vulnerability) -> Self {
        Self {
            code_context: v.code_context.clone(),
            code_file: v.code_file.clone(),
            code_line: v.code_line.clone(),
            confidence: v.confidence.clone(),
            created_at: v.created_at,
            description: v.description.clone(),
            exploitability: v.exploitability.clone(),
            extra_metadata: v.extra_metadata.to_string(),
            found_by: v.found_by.clone(),
            id: v.id,
            impact: v.impact.clone(),
            likelihood: v.likelihood.clone(),
            notes: v.notes.clone(),
            severity: v.severity.clone(),
            state: v.state.clone(),
            title: v.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedScan {
    pub id: Uuid,
    pub project: ArchivedProject,
    pub scan_number: i64,
    pub scanned_at: DateTime<Utc>,
    pub scanner_versions_used: Vec<String>,
    pub vulnerabilities: Vec<ArchivedVulnerability>,
}

impl ArchivedScan {
    /// 以新的 id 还原扫描记录
    pub fn restore_scan(&self, project: Uuid) -> Scan {
        let mut scan = Scan::new(project, self.scan_number);
        scan.created_at = self.scanned_at;
        scan.scanner_versions_used = self.scanner_versions_used.clone();
        scan
    }

    /// 以新的 id 还原漏洞，挂到给定的项目和扫描下
    pub fn into_vulnerabilities(self, project: Uuid, scan: Uuid) -> Vec<Vulnerability> {
        self.vulnerabilities
            .into_iter()
            .map(|archived| {
                let extra_metadata = serde_json::from_str(&archived.extra_metadata)
                    .unwrap_or(serde_json::Value::String(archived.extra_metadata));
                Vulnerability {
                    id: Uuid::new_v4(),
                    created_at: archived.created_at,
                    scan,
                    project,
                    title: archived.title,
                    description: archived.description,
                    severity: archived.severity,
                    confidence: archived.confidence,
                    impact: archived.impact,
                    likelihood: archived.likelihood,
                    code_file: archived.code_file,
                    code_line: archived.code_line,
                    code_context: archived.code_context,
                    found_by: archived.found_by,
                    extra_metadata,
                    state: archived.state,
                    exploitability: archived.exploitability,
                    notes: archived.notes,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanArchive {
    pub scan: ArchivedScan,
    pub archive_created_at: DateTime<Utc>,
    pub archive_creator: ArchiveUser,
}

impl ScanArchive {
    pub async fn build(store: &dyn Store, scan_id: Uuid, requester: &User) -> Result<Self> {
        let scan = store.get_scan(scan_id).await?;
        let project = store.get_project(scan.project).await?;
        let owner = store.get_user(project.owner).await?;
        let vulnerabilities = store.list_scan_vulnerabilities(scan.id).await?;

        tracing::debug!(
            "Exporting scan {} ({} vulnerabilities) for {}",
            scan.id,
            vulnerabilities.len(),
            requester.username
        );

        Ok(Self {
            scan: ArchivedScan {
                id: scan.id,
                project: ArchivedProject::new(&project, &owner),
                scan_number: scan.number,
                scanned_at: scan.scanned_at(),
                scanner_versions_used: scan.scanner_versions_used.clone(),
                vulnerabilities: vulnerabilities.iter().map(ArchivedVulnerability::from).collect(),
            },
            archive_created_at: Utc::now(),
            archive_creator: ArchiveUser::from(requester),
        })
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}
