// SQLite 持久化：实现 hermes_core::Store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermes_core::error::{CoreError, Result};
use hermes_core::{
    Notification, NotificationLevel, Project, ProjectAutomation, Scan, Store, User, Vulnerability,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    owner INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    directory TEXT NOT NULL DEFAULT '',
    is_git_based INTEGER NOT NULL DEFAULT 0,
    code_scanners TEXT NOT NULL DEFAULT '[]',
    is_public INTEGER NOT NULL DEFAULT 0,
    other_users TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS scans (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    number INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    scanner_versions_used TEXT NOT NULL DEFAULT '[]',
    UNIQUE(project_id, number),
    FOREIGN KEY(project_id) REFERENCES projects(id)
);

CREATE TABLE IF NOT EXISTS vulnerabilities (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT UNIQUE NOT NULL,
    created_at TEXT NOT NULL,
    scan_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    severity TEXT NOT NULL,
    confidence TEXT NOT NULL,
    impact TEXT NOT NULL,
    likelihood TEXT NOT NULL,
    code_file TEXT NOT NULL,
    code_line TEXT NOT NULL,
    code_context TEXT NOT NULL,
    found_by TEXT NOT NULL,
    extra_metadata TEXT NOT NULL DEFAULT '{}',
    state TEXT NOT NULL DEFAULT 'New',
    exploitability TEXT NOT NULL DEFAULT 'Unknown',
    notes TEXT NOT NULL DEFAULT '',
    FOREIGN KEY(scan_id) REFERENCES scans(id),
    FOREIGN KEY(project_id) REFERENCES projects(id)
);

CREATE TABLE IF NOT EXISTS notifications (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT UNIQUE NOT NULL,
    target INTEGER NOT NULL,
    message TEXT NOT NULL,
    level TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_automations (
    id TEXT PRIMARY KEY,
    project_id TEXT UNIQUE NOT NULL,
    scan_interval INTEGER,
    last_scanned_at TEXT,
    pull_interval INTEGER,
    last_pulled_at TEXT,
    FOREIGN KEY(project_id) REFERENCES projects(id)
);
"#;

/// 分配扫描序号时遇到唯一约束冲突的重试次数
const SCAN_NUMBER_RETRIES: usize = 5;

pub async fn init_db(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    // 使用 SqliteConnectOptions 来确保数据库文件可以被创建
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    migrate(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create tables: {}", e))?;

    tracing::info!("Database initialized at {}", database_url);
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Sqlite>) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Store(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| CoreError::Store(format!("bad uuid {:?}: {}", raw, e)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::Store(format!("bad timestamp {:?}: {}", raw, e)))
}

fn parse_opt_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
        }
    }
}

#[derive(FromRow)]
struct ProjectRow {
    id: String,
    owner: i64,
    created_at: String,
    title: String,
    description: String,
    directory: String,
    is_git_based: bool,
    code_scanners: String,
    is_public: bool,
    other_users: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = CoreError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            id: parse_uuid(&row.id)?,
            owner: row.owner,
            created_at: parse_time(&row.created_at)?,
            title: row.title,
            description: row.description,
            directory: row.directory,
            is_git_based: row.is_git_based,
            code_scanners: serde_json::from_str(&row.code_scanners)?,
            is_public: row.is_public,
            other_users: serde_json::from_str(&row.other_users)?,
        })
    }
}

#[derive(FromRow)]
struct ScanRow {
    id: String,
    project_id: String,
    number: i64,
    created_at: String,
    scanner_versions_used: String,
}

impl TryFrom<ScanRow> for Scan {
    type Error = CoreError;

    fn try_from(row: ScanRow) -> Result<Self> {
        Ok(Scan {
            id: parse_uuid(&row.id)?,
            created_at: parse_time(&row.created_at)?,
            project: parse_uuid(&row.project_id)?,
            number: row.number,
            scanner_versions_used: serde_json::from_str(&row.scanner_versions_used)?,
        })
    }
}

#[derive(FromRow)]
struct VulnerabilityRow {
    id: String,
    created_at: String,
    scan_id: String,
    project_id: String,
    title: String,
    description: String,
    severity: String,
    confidence: String,
    impact: String,
    likelihood: String,
    code_file: String,
    code_line: String,
    code_context: String,
    found_by: String,
    extra_metadata: String,
    state: String,
    exploitability: String,
    notes: String,
}

impl TryFrom<VulnerabilityRow> for Vulnerability {
    type Error = CoreError;

    fn try_from(row: VulnerabilityRow) -> Result<Self> {
        Ok(Vulnerability {
            id: parse_uuid(&row.id)?,
            created_at: parse_time(&row.created_at)?,
            scan: parse_uuid(&row.scan_id)?,
            project: parse_uuid(&row.project_id)?,
            title: row.title,
            description: row.description,
            severity: row.severity,
            confidence: row.confidence,
            impact: row.impact,
            likelihood: row.likelihood,
            code_file: row.code_file,
            code_line: row.code_line,
            code_context: row.code_context,
            found_by: row.found_by,
            extra_metadata: serde_json::from_str(&row.extra_metadata)?,
            state: row.state,
            exploitability: row.exploitability,
            notes: row.notes,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    seq: i64,
    id: String,
    target: i64,
    message: String,
    level: String,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = CoreError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: parse_uuid(&row.id)?,
            target: row.target,
            message: row.message,
            level: NotificationLevel::from_str(&row.level)?,
            created_at: parse_time(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct AutomationRow {
    id: String,
    project_id: String,
    scan_interval: Option<i64>,
    last_scanned_at: Option<String>,
    pull_interval: Option<i64>,
    last_pulled_at: Option<String>,
}

impl TryFrom<AutomationRow> for ProjectAutomation {
    type Error = CoreError;

    fn try_from(row: AutomationRow) -> Result<Self> {
        Ok(ProjectAutomation {
            id: parse_uuid(&row.id)?,
            project: parse_uuid(&row.project_id)?,
            scan_interval: row.scan_interval,
            last_scanned_at: parse_opt_time(row.last_scanned_at)?,
            pull_interval: row.pull_interval,
            last_pulled_at: parse_opt_time(row.last_pulled_at)?,
        })
    }
}

const SCAN_COLUMNS: &str = "id, project_id, number, created_at, scanner_versions_used";

const VULNERABILITY_COLUMNS: &str = "id, created_at, scan_id, project_id, title, description, \
    severity, confidence, impact, likelihood, code_file, code_line, code_context, found_by, \
    extra_metadata, state, exploitability, notes";

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn project_exists(&self, id: Uuid) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn fetch_scan(&self, clause: &str, binds: &[String]) -> Result<Option<Scan>> {
        let sql = format!("SELECT {} FROM scans WHERE {}", SCAN_COLUMNS, clause);
        let mut query = sqlx::query_as::<_, ScanRow>(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(Scan::try_from)
            .transpose()
    }

    async fn fetch_vulnerabilities(&self, column: &str, id: Uuid) -> Result<Vec<Vulnerability>> {
        let sql = format!(
            "SELECT {} FROM vulnerabilities WHERE {} = ? ORDER BY seq",
            VULNERABILITY_COLUMNS, column
        );
        sqlx::query_as::<_, VulnerabilityRow>(&sql)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Vulnerability::try_from)
            .collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, first_name, last_name, email) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET username = excluded.username,
                first_name = excluded.first_name, last_name = excluded.last_name,
                email = excluded.email",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, first_name, last_name, email FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(User::from)
        .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))
    }

    async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            "INSERT INTO projects (id, owner, created_at, title, description, directory,
                is_git_based, code_scanners, is_public, other_users)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, title = excluded.title,
                description = excluded.description, directory = excluded.directory,
                is_git_based = excluded.is_git_based, code_scanners = excluded.code_scanners,
                is_public = excluded.is_public, other_users = excluded.other_users",
        )
        .bind(project.id.to_string())
        .bind(project.owner)
        .bind(project.created_at.to_rfc3339())
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.directory)
        .bind(project.is_git_based)
        .bind(serde_json::to_string(&project.code_scanners)?)
        .bind(project.is_public)
        .bind(serde_json::to_string(&project.other_users)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Project> {
        sqlx::query_as::<_, ProjectRow>(
            "SELECT id, owner, created_at, title, description, directory, is_git_based,
                code_scanners, is_public, other_users
             FROM projects WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CoreError::NotFound(format!("project {}", id)))?
        .try_into()
    }

    async fn update_project_scanners(&self, id: Uuid, scanners: &[String]) -> Result<()> {
        let result = sqlx::query("UPDATE projects SET code_scanners = ? WHERE id = ?")
            .bind(serde_json::to_string(scanners)?)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("project {}", id)));
        }
        Ok(())
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for sql in [
            "DELETE FROM vulnerabilities WHERE project_id = ?",
            "DELETE FROM scans WHERE project_id = ?",
            "DELETE FROM project_automations WHERE project_id = ?",
        ] {
            sqlx::query(sql)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("project {}", id)));
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn create_scan(&self, project: Uuid) -> Result<Scan> {
        if !self.project_exists(project).await? {
            return Err(CoreError::NotFound(format!("project {}", project)));
        }

        // 序号在单条 INSERT 内计算，唯一约束兜底并发写入
        for attempt in 1..=SCAN_NUMBER_RETRIES {
            let id = Uuid::new_v4();
            let inserted = sqlx::query(
                "INSERT INTO scans (id, project_id, number, created_at, scanner_versions_used)
                 SELECT ?, ?, COALESCE(MAX(number), 0) + 1, ?, '[]'
                 FROM scans WHERE project_id = ?",
            )
            .bind(id.to_string())
            .bind(project.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(project.to_string())
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => return self.get_scan(id).await,
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(
                        "Scan number collision for project {} (attempt {})",
                        project,
                        attempt
                    );
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        Err(CoreError::Store(format!(
            "could not allocate a scan number for project {}",
            project
        )))
    }

    async fn get_scan(&self, id: Uuid) -> Result<Scan> {
        self.fetch_scan("id = ?", &[id.to_string()])
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("scan {}", id)))
    }

    async fn get_scan_by_number(&self, project: Uuid, number: i64) -> Result<Scan> {
        self.fetch_scan(
            "project_id = ? AND number = ?",
            &[project.to_string(), number.to_string()],
        )
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("scan number {}", number)))
    }

    async fn list_scans(&self, project: Uuid) -> Result<Vec<Scan>> {
        let sql = format!(
            "SELECT {} FROM scans WHERE project_id = ? ORDER BY number",
            SCAN_COLUMNS
        );
        sqlx::query_as::<_, ScanRow>(&sql)
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Scan::try_from)
            .collect()
    }

    async fn append_scanner_version(&self, scan: Uuid, version: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scans SET scanner_versions_used = json_insert(scanner_versions_used, '$[#]', ?)
             WHERE id = ?",
        )
        .bind(version)
        .bind(scan.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("scan {}", scan)));
        }
        Ok(())
    }

    async fn insert_vulnerability(&self, vuln: &Vulnerability) -> Result<()> {
        let sql = format!(
            "INSERT INTO vulnerabilities ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            VULNERABILITY_COLUMNS
        );
        sqlx::query(&sql)
            .bind(vuln.id.to_string())
            .bind(vuln.created_at.to_rfc3339())
            .bind(vuln.scan.to_string())
            .bind(vuln.project.to_string())
            .bind(&vuln.title)
            .bind(&vuln.description)
            .bind(&vuln.severity)
            .bind(&vuln.confidence)
            .bind(&vuln.impact)
            .bind(&vuln.likelihood)
            .bind(&vuln.code_file)
            .bind(&vuln.code_line)
            .bind(&vuln.code_context)
            .bind(&vuln.found_by)
            .bind(vuln.extra_metadata.to_string())
            .bind(&vuln.state)
            .bind(&vuln.exploitability)
            .bind(&vuln.notes)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_scan_vulnerabilities(&self, scan: Uuid) -> Result<Vec<Vulnerability>> {
        self.fetch_vulnerabilities("scan_id", scan).await
    }

    async fn list_project_vulnerabilities(&self, project: Uuid) -> Result<Vec<Vulnerability>> {
        self.fetch_vulnerabilities("project_id", project).await
    }

    async fn create_notification(
        &self,
        target: i64,
        message: &str,
        level: NotificationLevel,
    ) -> Result<Notification> {
        let notification = Notification::new(target, message, level);
        sqlx::query(
            "INSERT INTO notifications (id, target, message, level, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(notification.id.to_string())
        .bind(notification.target)
        .bind(&notification.message)
        .bind(notification.level.as_str())
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(notification)
    }

    async fn take_notifications(&self, target: i64) -> Result<Vec<Notification>> {
        // 单条语句读取并删除，期间插入的通知留到下一次
        let mut rows = sqlx::query_as::<_, NotificationRow>(
            "DELETE FROM notifications WHERE target = ?
             RETURNING seq, id, target, message, level, created_at",
        )
        .bind(target)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        // RETURNING 不保证顺序
        rows.sort_by_key(|row| row.seq);

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn get_automation(&self, project: Uuid) -> Result<Option<ProjectAutomation>> {
        sqlx::query_as::<_, AutomationRow>(
            "SELECT id, project_id, scan_interval, last_scanned_at, pull_interval, last_pulled_at
             FROM project_automations WHERE project_id = ?",
        )
        .bind(project.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(ProjectAutomation::try_from)
        .transpose()
    }

    async fn save_automation(&self, automation: &ProjectAutomation) -> Result<()> {
        sqlx::query(
            "INSERT INTO project_automations
                (id, project_id, scan_interval, last_scanned_at, pull_interval, last_pulled_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET scan_interval = excluded.scan_interval,
                last_scanned_at = excluded.last_scanned_at,
                pull_interval = excluded.pull_interval,
                last_pulled_at = excluded.last_pulled_at",
        )
        .bind(automation.id.to_string())
        .bind(automation.project.to_string())
        .bind(automation.scan_interval)
        .bind(automation.last_scanned_at.map(|t| t.to_rfc3339()))
        .bind(automation.pull_interval)
        .bind(automation.last_pulled_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        // 单连接，保证所有查询落在同一个内存数据库上
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    async fn seeded() -> (SqliteStore, Project) {
        let store = memory_store().await;
        store.insert_user(&User::new(1, "ethan")).await.unwrap();
        let project = Project::new(1, "demo").with_scanners(["bandit", "semgrep"]);
        store.insert_project(&project).await.unwrap();
        (store, project)
    }

    #[tokio::test]
    async fn project_round_trips() {
        let (store, project) = seeded().await;
        let loaded = store.get_project(project.id).await.unwrap();
        assert_eq!(loaded.title, "demo");
        assert_eq!(loaded.code_scanners, vec!["bandit", "semgrep"]);
        assert_eq!(loaded.created_at.timestamp(), project.created_at.timestamp());

        store
            .update_project_scanners(project.id, &["gosec".to_string()])
            .await
            .unwrap();
        assert_eq!(
            store.get_project(project.id).await.unwrap().code_scanners,
            vec!["gosec"]
        );
    }

    #[tokio::test]
    async fn scan_numbers_increase_per_project() {
        let (store, project) = seeded().await;
        let other = Project::new(1, "other");
        store.insert_project(&other).await.unwrap();

        assert_eq!(store.create_scan(project.id).await.unwrap().number, 1);
        assert_eq!(store.create_scan(project.id).await.unwrap().number, 2);
        assert_eq!(store.create_scan(other.id).await.unwrap().number, 1);

        let numbers: Vec<i64> = store
            .list_scans(project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(store.get_scan_by_number(project.id, 2).await.unwrap().number, 2);
    }

    #[tokio::test]
    async fn concurrent_scan_creation_never_collides() {
        let (store, project) = seeded().await;
        let store = std::sync::Arc::new(store);
        let project_id = project.id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_scan(project_id).await.unwrap().number
            }));
        }
        let mut numbers = Vec::new();
        for h in handles {
            numbers.push(h.await.unwrap());
        }
        numbers.sort();
        assert_eq!(numbers, (1..=10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn scan_for_unknown_project_is_not_found() {
        let store = memory_store().await;
        assert!(matches!(
            store.create_scan(Uuid::new_v4()).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn versions_and_vulnerabilities_persist() {
        let (store, project) = seeded().await;
        let scan = store.create_scan(project.id).await.unwrap();
        store.append_scanner_version(scan.id, "Bandit 1.7.5").await.unwrap();
        store.append_scanner_version(scan.id, "Semgrep 1.50.0").await.unwrap();
        assert_eq!(
            store.get_scan(scan.id).await.unwrap().scanner_versions_used,
            vec!["Bandit 1.7.5", "Semgrep 1.50.0"]
        );

        let mut first = Vulnerability::new(scan.id, project.id, "B101:assert_used");
        first.code_line = "41-43".into();
        first.extra_metadata = serde_json::json!({"test_id": "B101"});
        store.insert_vulnerability(&first).await.unwrap();
        store
            .insert_vulnerability(&Vulnerability::new(scan.id, project.id, "second"))
            .await
            .unwrap();

        let vulns = store.list_scan_vulnerabilities(scan.id).await.unwrap();
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0], first);
        assert_eq!(vulns[1].title, "second");
        assert_eq!(
            store.list_project_vulnerabilities(project.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn delete_project_removes_children() {
        let (store, project) = seeded().await;
        let scan = store.create_scan(project.id).await.unwrap();
        store
            .insert_vulnerability(&Vulnerability::new(scan.id, project.id, "x"))
            .await
            .unwrap();
        store
            .save_automation(&ProjectAutomation::new(project.id))
            .await
            .unwrap();

        store.delete_project(project.id).await.unwrap();

        assert!(store.list_scans(project.id).await.unwrap().is_empty());
        assert!(store
            .list_project_vulnerabilities(project.id)
            .await
            .unwrap()
            .is_empty());
        assert!(store.get_automation(project.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_project(project.id).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn notifications_are_read_once() {
        let store = memory_store().await;
        store
            .create_notification(1, "first", NotificationLevel::Error)
            .await
            .unwrap();
        store
            .create_notification(1, "second", NotificationLevel::Success)
            .await
            .unwrap();
        store
            .create_notification(2, "someone else", NotificationLevel::Info)
            .await
            .unwrap();

        let taken = store.take_notifications(1).await.unwrap();
        let messages: Vec<_> = taken.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(taken[0].level, NotificationLevel::Error);
        assert!(store.take_notifications(1).await.unwrap().is_empty());
        assert_eq!(store.take_notifications(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notifications_created_between_takes_are_never_lost() {
        let store = memory_store().await;
        let mut writers = Vec::new();
        for n in 0..20 {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                store
                    .create_notification(1, &format!("note {}", n), NotificationLevel::Info)
                    .await
                    .unwrap();
            }));
        }

        let mut seen = 0;
        for _ in 0..5 {
            seen += store.take_notifications(1).await.unwrap().len();
            tokio::task::yield_now().await;
        }
        for writer in writers {
            writer.await.unwrap();
        }
        seen += store.take_notifications(1).await.unwrap().len();

        assert_eq!(seen, 20);
        assert!(store.take_notifications(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn automation_upserts_by_project() {
        let (store, project) = seeded().await;
        let mut automation = ProjectAutomation::new(project.id);
        store.save_automation(&automation).await.unwrap();

        automation.last_pulled_at = Some(Utc::now());
        automation.pull_interval = Some(3600);
        store.save_automation(&automation).await.unwrap();

        let loaded = store.get_automation(project.id).await.unwrap().unwrap();
        assert_eq!(loaded.pull_interval, Some(3600));
        assert!(loaded.last_pulled_at.is_some());
        assert!(loaded.last_scanned_at.is_none());
    }
}
