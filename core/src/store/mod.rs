// 持久化接口 - 扫描编排只通过此 trait 读写数据

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    Notification, NotificationLevel, Project, ProjectAutomation, Scan, User, Vulnerability,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: i64) -> Result<User>;

    async fn insert_project(&self, project: &Project) -> Result<()>;

    async fn get_project(&self, id: Uuid) -> Result<Project>;

    async fn update_project_scanners(&self, id: Uuid, scanners: &[String]) -> Result<()>;

    /// 删除项目及其扫描、漏洞和自动化记录
    async fn delete_project(&self, id: Uuid) -> Result<()>;

    /// 创建扫描并分配项目内的下一个序号，同一项目的并发调用不会得到重复序号
    async fn create_scan(&self, project: Uuid) -> Result<Scan>;

    async fn get_scan(&self, id: Uuid) -> Result<Scan>;

    async fn get_scan_by_number(&self, project: Uuid, number: i64) -> Result<Scan>;

    /// 按序号升序
    async fn list_scans(&self, project: Uuid) -> Result<Vec<Scan>>;

    async fn append_scanner_version(&self, scan: Uuid, version: &str) -> Result<()>;

    async fn insert_vulnerability(&self, vuln: &Vulnerability) -> Result<()>;

    /// 按写入顺序
    async fn list_scan_vulnerabilities(&self, scan: Uuid) -> Result<Vec<Vulnerability>>;

    async fn list_project_vulnerabilities(&self, project: Uuid) -> Result<Vec<Vulnerability>>;

    async fn create_notification(
        &self,
        target: i64,
        message: &str,
        level: NotificationLevel,
    ) -> Result<Notification>;

    /// 读取并清空用户的待显示通知
    async fn take_notifications(&self, target: i64) -> Result<Vec<Notification>>;

    async fn get_automation(&self, project: Uuid) -> Result<Option<ProjectAutomation>>;

    async fn save_automation(&self, automation: &ProjectAutomation) -> Result<()>;
}
