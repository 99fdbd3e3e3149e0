use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::{CoreError, Result};
use crate::model::{
    Notification, NotificationLevel, Project, ProjectAutomation, Scan, User, Vulnerability,
};

#[derive(Default)]
struct Inner {
    users: HashMap<i64, User>,
    projects: HashMap<Uuid, Project>,
    scans: Vec<Scan>,
    vulnerabilities: Vec<Vulnerability>,
    notifications: Vec<Notification>,
    automations: HashMap<Uuid, ProjectAutomation>,
}

/// 内存存储，所有写操作在同一把写锁下完成
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn project_count(&self) -> usize {
        self.inner.read().await.projects.len()
    }

    /// 当前所有通知（不清空），便于检查
    pub async fn notifications_for(&self, target: i64) -> Vec<Notification> {
        let inner = self.inner.read().await;
        inner
            .notifications
            .iter()
            .filter(|n| n.target == target)
            .cloned()
            .collect()
    }
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> CoreError {
    CoreError::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        let inner = self.inner.read().await;
        inner
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("user", id))
    }

    async fn insert_project(&self, project: &Project) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Project> {
        let inner = self.inner.read().await;
        inner
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("project", id))
    }

    async fn update_project_scanners(&self, id: Uuid, scanners: &[String]) -> Result<()> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&id)
            .ok_or_else(|| not_found("project", id))?;
        project.code_scanners = scanners.to_vec();
        Ok(())
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.projects.remove(&id).is_none() {
            return Err(not_found("project", id));
        }
        inner.scans.retain(|s| s.project != id);
        inner.vulnerabilities.retain(|v| v.project != id);
        inner.automations.remove(&id);
        Ok(())
    }

    async fn create_scan(&self, project: Uuid) -> Result<Scan> {
        let mut inner = self.inner.write().await;
        if !inner.projects.contains_key(&project) {
            return Err(not_found("project", project));
        }
        let number = inner
            .scans
            .iter()
            .filter(|s| s.project == project)
            .map(|s| s.number)
            .max()
            .unwrap_or(0)
            + 1;
        let scan = Scan::new(project, number);
        inner.scans.push(scan.clone());
        Ok(scan)
    }

    async fn get_scan(&self, id: Uuid) -> Result<Scan> {
        let inner = self.inner.read().await;
        inner
            .scans
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("scan", id))
    }

    async fn get_scan_by_number(&self, project: Uuid, number: i64) -> Result<Scan> {
        let inner = self.inner.read().await;
        inner
            .scans
            .iter()
            .find(|s| s.project == project && s.number == number)
            .cloned()
            .ok_or_else(|| not_found("scan number", number))
    }

    async fn list_scans(&self, project: Uuid) -> Result<Vec<Scan>> {
        let inner = self.inner.read().await;
        let mut scans: Vec<Scan> = inner
            .scans
            .iter()
            .filter(|s| s.project == project)
            .cloned()
            .collect();
        scans.sort_by_key(|s| s.number);
        Ok(scans)
    }

    async fn append_scanner_version(&self, scan: Uuid, version: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let scan = inner
            .scans
            .iter_mut()
            .find(|s| s.id == scan)
            .ok_or_else(|| not_found("scan", scan))?;
        scan.scanner_versions_used.push(version.to_string());
        Ok(())
    }

    async fn insert_vulnerability(&self, vuln: &Vulnerability) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.vulnerabilities.push(vuln.clone());
        Ok(())
    }

    async fn list_scan_vulnerabilities(&self, scan: Uuid) -> Result<Vec<Vulnerability>> {
        let inner = self.inner.read().await;
        Ok(inner
            .vulnerabilities
            .iter()
            .filter(|v| v.scan == scan)
            .cloned()
            .collect())
    }

    async fn list_project_vulnerabilities(&self, project: Uuid) -> Result<Vec<Vulnerability>> {
        let inner = self.inner.read().await;
        Ok(inner
            .vulnerabilities
            .iter()
            .filter(|v| v.project == project)
            .cloned()
            .collect())
    }

    async fn create_notification(
        &self,
        target: i64,
        message: &str,
        level: NotificationLevel,
    ) -> Result<Notification> {
        let notification = Notification::new(target, message, level);
        let mut inner = self.inner.write().await;
        inner.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn take_notifications(&self, target: i64) -> Result<Vec<Notification>> {
        let mut inner = self.inner.write().await;
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.notifications)
            .into_iter()
            .partition(|n| n.target == target);
        inner.notifications = kept;
        Ok(taken)
    }

    async fn get_automation(&self, project: Uuid) -> Result<Option<ProjectAutomation>> {
        let inner = self.inner.read().await;
        Ok(inner.automations.get(&project).cloned())
    }

    async fn save_automation(&self, automation: &ProjectAutomation) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .automations
            .insert(automation.project, automation.clone());
        Ok(())
    }
}
