// 扫描编排：依次运行项目配置的扫描器，单个扫描器失败不影响其他扫描器

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::HermesConfig;
use crate::error::{CoreError, Result};
use crate::locks::ProjectLocks;
use crate::model::{NotificationLevel, Project, ProjectAutomation, Scan};
use crate::scanner::registry::ScannerRegistry;
use crate::scanner::runner::{run_checked, zero_only, CommandLine, CommandRunner};
use crate::scanner::{ScanContext, Scanner};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Succeeded,
    PartiallyFailed,
    TotallyFailed,
}

impl ScanOutcome {
    fn from_counts(attempted: usize, failed: usize) -> Self {
        if failed == attempted {
            ScanOutcome::TotallyFailed
        } else if failed == 0 {
            ScanOutcome::Succeeded
        } else {
            ScanOutcome::PartiallyFailed
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan: Scan,
    pub outcome: ScanOutcome,
    pub attempted: usize,
    pub failed: usize,
    pub findings: usize,
}

#[derive(Clone)]
pub struct ScanOrchestrator {
    store: Arc<dyn Store>,
    registry: Arc<ScannerRegistry>,
    runner: Arc<dyn CommandRunner>,
    config: Arc<HermesConfig>,
    locks: ProjectLocks,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ScannerRegistry>,
        runner: Arc<dyn CommandRunner>,
        config: Arc<HermesConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            runner,
            config,
            locks: ProjectLocks::new(),
        }
    }

    pub fn with_locks(mut self, locks: ProjectLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ScannerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<HermesConfig> {
        &self.config
    }

    async fn notify(&self, user: i64, message: String, level: NotificationLevel) -> Result<()> {
        self.store.create_notification(user, &message, level).await?;
        Ok(())
    }

    /// 扫描循环内使用：通知写入失败只记录日志
    async fn notify_logged(&self, user: i64, message: String, level: NotificationLevel) {
        if let Err(e) = self.store.create_notification(user, &message, level).await {
            tracing::error!("Failed to record notification {:?} for user {}: {}", message, user, e);
        }
    }

    /// 运行项目配置的全部扫描器，并记录一次新的扫描
    pub async fn run_scanners(&self, project_id: Uuid, user_id: i64) -> Result<ScanReport> {
        // 按 id 重新读取，任务可能被延迟执行
        let project = self.store.get_project(project_id).await?;
        let user = self.store.get_user(user_id).await?;

        let _tree = self.locks.read(project.id).await;
        let scan = self.store.create_scan(project.id).await?;
        let ctx = ScanContext::new(&project, &scan, &self.config);
        tracing::info!(
            "Starting scan #{} for project {} ({} scanners)",
            scan.number,
            project.id,
            project.code_scanners.len()
        );

        let attempted = project.code_scanners.len();
        let mut failed = 0;
        let mut findings = 0;

        for scanner_id in &project.code_scanners {
            let Some(scanner) = self.registry.get(scanner_id) else {
                tracing::warn!("Project {} references unknown scanner {}", project.id, scanner_id);
                self.notify_logged(
                    user.id,
                    format!("Failed to find an interface with id {}", scanner_id),
                    NotificationLevel::Error,
                )
                .await;
                failed += 1;
                continue;
            };

            match self.run_one(scanner.as_ref(), &ctx).await {
                Ok(count) => {
                    tracing::info!("{} reported {} findings for scan {}", scanner_id, count, scan.id);
                    findings += count;
                }
                Err(e) => {
                    match e.captured_output() {
                        Some(output) => tracing::error!(
                            "Scanner {} failed: {}\n{}",
                            scanner_id,
                            e,
                            String::from_utf8_lossy(output)
                        ),
                        None => tracing::error!("Scanner {} failed: {}", scanner_id, e),
                    }
                    self.notify_logged(
                        user.id,
                        format!("Interface {} failed to run", scanner_id),
                        NotificationLevel::Error,
                    )
                    .await;
                    failed += 1;
                }
            }
        }

        let outcome = ScanOutcome::from_counts(attempted, failed);
        let (message, level) = match outcome {
            ScanOutcome::TotallyFailed => (
                format!(
                    "Looks like all interfaces could not be found. Ran nothing for project '{}'",
                    project.title
                ),
                NotificationLevel::Error,
            ),
            ScanOutcome::PartiallyFailed => (
                format!(
                    "Ran {} of {} scanners against project '{}', {} failed",
                    attempted - failed,
                    attempted,
                    project.title,
                    failed
                ),
                NotificationLevel::Warning,
            ),
            ScanOutcome::Succeeded => (
                format!(
                    "Successfully ran found scanners against project '{}'",
                    project.title
                ),
                NotificationLevel::Success,
            ),
        };
        self.notify(user.id, message, level).await?;

        if let Some(mut automation) = self.store.get_automation(project.id).await? {
            automation.last_scanned_at = Some(Utc::now());
            self.store.save_automation(&automation).await?;
        }

        tracing::info!(
            "Scan #{} for project {} finished: {:?} ({} of {} failed, {} findings)",
            scan.number,
            project.id,
            outcome,
            failed,
            attempted,
            findings
        );

        let scan = self.store.get_scan(scan.id).await?;
        Ok(ScanReport {
            scan,
            outcome,
            attempted,
            failed,
            findings,
        })
    }

    /// 运行单个扫描器并逐条保存结果，返回保存的条数
    async fn run_one(&self, scanner: &dyn Scanner, ctx: &ScanContext) -> Result<usize> {
        if let Some(probe) = scanner.version_command() {
            match self.runner.run(&probe).await {
                Ok(out) if out.exit_code == 0 => {
                    let version = scanner.format_version(&out.stdout);
                    self.store.append_scanner_version(ctx.scan, &version).await?;
                }
                Ok(out) => tracing::warn!(
                    "Version probe `{}` exited with {}",
                    probe,
                    out.exit_code
                ),
                Err(e) => tracing::warn!("Version probe `{}` failed: {}", probe, e),
            }
        }

        let command = scanner.build_command(ctx);
        let output = run_checked(self.runner.as_ref(), &command, |code| {
            scanner.accepts_exit_code(code)
        })
        .await?;

        let vulns = scanner.parse(&output.stdout, ctx)?;
        for vuln in &vulns {
            self.store.insert_vulnerability(vuln).await?;
        }
        Ok(vulns.len())
    }

    /// git fetch + git pull
    pub async fn update_from_source(&self, project_id: Uuid, user_id: i64) -> Result<()> {
        let project = self.store.get_project(project_id).await?;
        let user = self.store.get_user(user_id).await?;

        if !project.is_git_based {
            tracing::error!("Refusing to pull non git based project {}", project.id);
            self.notify(
                user.id,
                format!(
                    "Cannot update project '{}' as it is not git based",
                    project.title
                ),
                NotificationLevel::Error,
            )
            .await?;
            return Err(CoreError::Precondition(format!(
                "project {} is not git based",
                project.id
            )));
        }

        let root = project.scanner_path(&self.config);
        let pulled = {
            let _tree = self.locks.write(project.id).await;
            self.pull(&root).await
        };

        if let Err(e) = pulled {
            tracing::error!("Pulling project {} failed: {}", project.id, e);
            if let Some(output) = e.captured_output() {
                tracing::error!("{}", String::from_utf8_lossy(output));
            }
            self.notify(
                user.id,
                format!(
                    "Something went wrong pulling project '{}', check the logs",
                    project.title
                ),
                NotificationLevel::Error,
            )
            .await?;
            return Err(e);
        }

        self.stamp_pulled(&project).await?;
        self.notify(
            user.id,
            format!("Successfully pulled project '{}'", project.title),
            NotificationLevel::Success,
        )
        .await?;
        Ok(())
    }

    async fn pull(&self, root: &Path) -> Result<()> {
        let fetch = CommandLine::new("git").arg("fetch").current_dir(root);
        let pull = CommandLine::new("git").arg("pull").current_dir(root);
        run_checked(self.runner.as_ref(), &fetch, zero_only).await?;
        run_checked(self.runner.as_ref(), &pull, zero_only).await?;
        Ok(())
    }

    async fn stamp_pulled(&self, project: &Project) -> Result<()> {
        if let Some(mut automation) = self.store.get_automation(project.id).await? {
            automation.last_pulled_at = Some(Utc::now());
            self.store.save_automation(&automation).await?;
        }
        Ok(())
    }

    /// 克隆仓库到 destination，目标目录必须不存在
    pub async fn git_clone(
        &self,
        git_url: &str,
        destination: &Path,
        project_id: Uuid,
        user_id: i64,
    ) -> Result<()> {
        let project = self.store.get_project(project_id).await?;
        let user = self.store.get_user(user_id).await?;

        if git_url.starts_with('-') {
            tracing::error!("Refusing to clone option-like url {:?}", git_url);
            return Err(CoreError::Precondition(format!(
                "git url must not start with '-': {}",
                git_url
            )));
        }

        let _tree = self.locks.write(project.id).await;
        if destination.exists() {
            tracing::error!(
                "Refusing to clone {} over existing path {}",
                git_url,
                destination.display()
            );
            self.notify(
                user.id,
                format!(
                    "Cannot clone into '{}' for project '{}', it already exists",
                    destination.display(),
                    project.title
                ),
                NotificationLevel::Error,
            )
            .await?;
            return Err(CoreError::Precondition(format!(
                "{} already exists",
                destination.display()
            )));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let clone = CommandLine::new("git")
            .args(["clone", "--recursive", "--", git_url])
            .arg(destination.to_string_lossy());
        if let Err(e) = run_checked(self.runner.as_ref(), &clone, zero_only).await {
            tracing::error!("Git cloning died with error: {}", e);
            if let Some(output) = e.captured_output() {
                tracing::error!("{}", String::from_utf8_lossy(output));
            }
            self.notify(
                user.id,
                "Something went wrong, check the logs".to_string(),
                NotificationLevel::Error,
            )
            .await?;
            return Err(e);
        }

        tracing::info!("Cloned {} into {}", git_url, destination.display());
        Ok(())
    }

    /// 项目源码的默认位置
    pub fn default_destination(&self, project: &Project) -> PathBuf {
        project.scanner_path(&self.config)
    }

    /// 为项目创建自动化记录（如果还没有）
    pub async fn ensure_automation(&self, project_id: Uuid) -> Result<ProjectAutomation> {
        if let Some(existing) = self.store.get_automation(project_id).await? {
            return Ok(existing);
        }
        let automation = ProjectAutomation::new(project_id);
        self.store.save_automation(&automation).await?;
        Ok(automation)
    }
}
