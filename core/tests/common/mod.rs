#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hermes_core::error::{CoreError, Result};
use hermes_core::{
    CommandLine, CommandRunner, HermesConfig, MemoryStore, Notification, NotificationLevel,
    ProcessOutput, Project, ProjectAutomation, Scan, ScanOrchestrator, ScannerRegistry, Store,
    User, Vulnerability,
};
use uuid::Uuid;

pub const BANDIT_TWO_FINDINGS: &str = r#"{
  "errors": [],
  "results": [
    {
      "code": "2 assert user.is_admin\n",
      "filename": "/work/.projects/demo/app.py",
      "issue_confidence": "HIGH",
      "issue_severity": "LOW",
      "issue_text": "Use of assert detected.",
      "line_number": 2,
      "test_id": "B101",
      "test_name": "assert_used"
    },
    {
      "code": "9 subprocess.call(cmd, shell=True)\n",
      "filename": "/work/.projects/demo/tasks/run.py",
      "issue_confidence": "HIGH",
      "issue_severity": "HIGH",
      "issue_text": "subprocess call with shell=True identified.",
      "line_number": 9,
      "test_id": "B602",
      "test_name": "subprocess_popen_with_shell_equals_true"
    }
  ]
}"#;

enum Reply {
    Output(ProcessOutput),
    Missing,
}

/// 按命令返回预设结果的 CommandRunner，不启动任何进程
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<CommandLine>>,
    delay: Mutex<Duration>,
    program_delays: Mutex<HashMap<String, Duration>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// key 为完整命令行或程序名
    pub fn reply(&self, key: &str, exit_code: i32, stdout: &str) {
        let output = ProcessOutput {
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        };
        self.replies
            .lock()
            .unwrap()
            .insert(key.to_string(), Reply::Output(output));
    }

    pub fn missing(&self, key: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(key.to_string(), Reply::Missing);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// 只对指定程序生效，优先于 set_delay
    pub fn delay_program(&self, program: &str, delay: Duration) {
        self.program_delays
            .lock()
            .unwrap()
            .insert(program.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn lookup(&self, cmd: &CommandLine) -> Result<ProcessOutput> {
        let replies = self.replies.lock().unwrap();
        let is_probe = cmd
            .args
            .iter()
            .any(|a| a == "--version" || a == "-version");
        let reply = match replies.get(&cmd.to_string()) {
            Some(reply) => Some(reply),
            None if is_probe => None,
            None => replies.get(&cmd.program),
        };
        match reply {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Missing) | None => Err(CoreError::Spawn {
                command: cmd.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not installed"),
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, cmd: &CommandLine) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .program_delays
            .lock()
            .unwrap()
            .get(&cmd.program)
            .copied()
            .unwrap_or_else(|| *self.delay.lock().unwrap());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.lookup(cmd)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub runner: Arc<ScriptedRunner>,
    pub orchestrator: ScanOrchestrator,
    pub user: User,
}

impl Harness {
    pub async fn new(config: HermesConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let runner = ScriptedRunner::new();
        let user = User::new(1, "ethan");
        store.insert_user(&user).await.unwrap();

        let orchestrator = ScanOrchestrator::new(
            store.clone(),
            Arc::new(ScannerRegistry::with_defaults()),
            runner.clone(),
            Arc::new(config),
        );

        Self {
            store,
            runner,
            orchestrator,
            user,
        }
    }

    pub async fn with_defaults() -> Self {
        Self::new(HermesConfig::default().with_project_dir("/work/.projects")).await
    }

    pub async fn project(&self, scanners: &[&str]) -> Project {
        let project = Project::new(self.user.id, "demo")
            .with_directory("demo")
            .with_scanners(scanners.iter().copied());
        self.store.insert_project(&project).await.unwrap();
        project
    }

    pub async fn messages(&self) -> Vec<String> {
        self.store
            .notifications_for(self.user.id)
            .await
            .into_iter()
            .map(|n| n.message)
            .collect()
    }
}

/// 转发到 MemoryStore，但拒绝写入包含 `reject` 的通知
pub struct RejectingNotices {
    pub inner: Arc<MemoryStore>,
    pub reject: &'static str,
}

#[async_trait]
impl Store for RejectingNotices {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        self.inner.get_user(id).await
    }

    async fn insert_project(&self, project: &Project) -> Result<()> {
        self.inner.insert_project(project).await
    }

    async fn get_project(&self, id: Uuid) -> Result<Project> {
        self.inner.get_project(id).await
    }

    async fn update_project_scanners(&self, id: Uuid, scanners: &[String]) -> Result<()> {
        self.inner.update_project_scanners(id, scanners).await
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        self.inner.delete_project(id).await
    }

    async fn create_scan(&self, project: Uuid) -> Result<Scan> {
        self.inner.create_scan(project).await
    }

    async fn get_scan(&self, id: Uuid) -> Result<Scan> {
        self.inner.get_scan(id).await
    }

    async fn get_scan_by_number(&self, project: Uuid, number: i64) -> Result<Scan> {
        self.inner.get_scan_by_number(project, number).await
    }

    async fn list_scans(&self, project: Uuid) -> Result<Vec<Scan>> {
        self.inner.list_scans(project).await
    }

    async fn append_scanner_version(&self, scan: Uuid, version: &str) -> Result<()> {
        self.inner.append_scanner_version(scan, version).await
    }

    async fn insert_vulnerability(&self, vuln: &Vulnerability) -> Result<()> {
        self.inner.insert_vulnerability(vuln).await
    }

    async fn list_scan_vulnerabilities(&self, scan: Uuid) -> Result<Vec<Vulnerability>> {
        self.inner.list_scan_vulnerabilities(scan).await
    }

    async fn list_project_vulnerabilities(&self, project: Uuid) -> Result<Vec<Vulnerability>> {
        self.inner.list_project_vulnerabilities(project).await
    }

    async fn create_notification(
        &self,
        target: i64,
        message: &str,
        level: NotificationLevel,
    ) -> Result<Notification> {
        if message.contains(self.reject) {
            return Err(CoreError::Store("notifications table is locked".to_string()));
        }
        self.inner.create_notification(target, message, level).await
    }

    async fn take_notifications(&self, target: i64) -> Result<Vec<Notification>> {
        self.inner.take_notifications(target).await
    }

    async fn get_automation(&self, project: Uuid) -> Result<Option<ProjectAutomation>> {
        self.inner.get_automation(project).await
    }

    async fn save_automation(&self, automation: &ProjectAutomation) -> Result<()> {
        self.inner.save_automation(automation).await
    }
}
