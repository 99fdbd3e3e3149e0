// 后台任务队列：有界通道 + 信号量限制并发，每个任务带超时

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::model::NotificationLevel;
use crate::orchestrator::ScanOrchestrator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    RunScanners {
        project: Uuid,
        user: i64,
    },
    UpdateFromSource {
        project: Uuid,
        user: i64,
    },
    /// 成功后自动追加一次 RunScanners
    GitClone {
        git_url: String,
        destination: PathBuf,
        project: Uuid,
        user: i64,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::RunScanners { .. } => "run_scanners",
            Job::UpdateFromSource { .. } => "update_from_source",
            Job::GitClone { .. } => "git_clone",
        }
    }

    pub fn project(&self) -> Uuid {
        match self {
            Job::RunScanners { project, .. }
            | Job::UpdateFromSource { project, .. }
            | Job::GitClone { project, .. } => *project,
        }
    }

    pub fn user(&self) -> i64 {
        match self {
            Job::RunScanners { user, .. }
            | Job::UpdateFromSource { user, .. }
            | Job::GitClone { user, .. } => *user,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

struct QueuedJob {
    id: Uuid,
    job: Job,
}

enum Message {
    Run(QueuedJob),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Message>,
    stats: Arc<Mutex<JobStats>>,
}

impl JobQueue {
    /// 启动调度循环，并发数、超时与队列容量取自编排器的配置
    pub fn start(orchestrator: ScanOrchestrator) -> (JobQueue, JoinHandle<()>) {
        let config = orchestrator.config().clone();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(Mutex::new(JobStats::default()));

        let dispatcher = Dispatcher {
            orchestrator,
            semaphore: Arc::new(Semaphore::new(config.job_concurrency)),
            concurrency: config.job_concurrency,
            timeout: config.job_timeout,
            stats: stats.clone(),
            chain: tx.downgrade(),
        };
        let handle = tokio::spawn(dispatcher.run(rx));

        (JobQueue { tx, stats }, handle)
    }

    /// 入队并立即返回任务 id，队列满时等待
    pub async fn enqueue(&self, job: Job) -> Result<Uuid> {
        let id = Uuid::new_v4();
        tracing::info!("Queueing {} job {} for project {}", job.kind(), id, job.project());
        self.tx
            .send(Message::Run(QueuedJob { id, job }))
            .await
            .map_err(|_| CoreError::QueueClosed)?;
        Ok(id)
    }

    pub async fn stats(&self) -> JobStats {
        *self.stats.lock().await
    }

    /// 停止接收新任务，等待运行中的任务结束
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown(done_tx))
            .await
            .map_err(|_| CoreError::QueueClosed)?;
        done_rx.await.map_err(|_| CoreError::QueueClosed)
    }
}

struct Dispatcher {
    orchestrator: ScanOrchestrator,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    timeout: Duration,
    stats: Arc<Mutex<JobStats>>,
    chain: mpsc::WeakSender<Message>,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<Message>) {
        let mut shutdown = None;
        while let Some(message) = rx.recv().await {
            match message {
                Message::Run(queued) => {
                    let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let worker = Worker {
                        orchestrator: self.orchestrator.clone(),
                        timeout: self.timeout,
                        stats: self.stats.clone(),
                        chain: self.chain.clone(),
                    };
                    tokio::spawn(worker.execute(queued, permit));
                }
                Message::Shutdown(done) => {
                    rx.close();
                    shutdown = Some(done);
                    break;
                }
            }
        }

        // 已入队但排在 Shutdown 之后的任务不会再执行
        let mut waiters = Vec::new();
        while let Ok(message) = rx.try_recv() {
            match message {
                Message::Run(queued) => self.cancel(queued).await,
                Message::Shutdown(done) => waiters.push(done),
            }
        }

        // 全部许可收回即表示没有运行中的任务
        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if let Ok(all) = self.semaphore.acquire_many(permits).await {
            drop(all);
        }
        tracing::info!("Job queue drained");
        for done in shutdown.into_iter().chain(waiters) {
            let _ = done.send(());
        }
    }

    async fn cancel(&self, queued: QueuedJob) {
        let QueuedJob { id, job } = queued;
        tracing::warn!("Queue shutting down, cancelling {} job {}", job.kind(), id);
        self.stats.lock().await.failed += 1;

        let message = format!(
            "Job {} was cancelled because the server is shutting down",
            job.kind()
        );
        if let Err(e) = self
            .orchestrator
            .store()
            .create_notification(job.user(), &message, NotificationLevel::Error)
            .await
        {
            tracing::error!("Failed to record cancellation notice: {}", e);
        }
    }
}

struct Worker {
    orchestrator: ScanOrchestrator,
    timeout: Duration,
    stats: Arc<Mutex<JobStats>>,
    chain: mpsc::WeakSender<Message>,
}

impl Worker {
    async fn execute(self, queued: QueuedJob, permit: OwnedSemaphorePermit) {
        let QueuedJob { id, job } = queued;
        self.stats.lock().await.running += 1;
        tracing::info!("Starting {} job {}", job.kind(), id);

        // 超时会丢弃 future，子进程随之被杀掉
        let result = tokio::time::timeout(self.timeout, self.dispatch(&job)).await;

        let follow_up = {
            let mut stats = self.stats.lock().await;
            stats.running -= 1;
            match &result {
                Ok(Ok(())) => {
                    stats.completed += 1;
                    tracing::info!("Job {} finished", id);
                    match &job {
                        Job::GitClone { project, user, .. } => Some(Job::RunScanners {
                            project: *project,
                            user: *user,
                        }),
                        _ => None,
                    }
                }
                Ok(Err(e)) => {
                    stats.failed += 1;
                    tracing::error!("Job {} ({}) failed: {}", id, job.kind(), e);
                    None
                }
                Err(_) => {
                    stats.failed += 1;
                    stats.timed_out += 1;
                    None
                }
            }
        };

        if result.is_err() {
            tracing::error!(
                "Job {} ({}) timed out after {} seconds",
                id,
                job.kind(),
                self.timeout.as_secs()
            );
            let message = format!(
                "Job {} timed out after {} seconds",
                job.kind(),
                self.timeout.as_secs()
            );
            if let Err(e) = self
                .orchestrator
                .store()
                .create_notification(job.user(), &message, NotificationLevel::Error)
                .await
            {
                tracing::error!("Failed to record timeout notification: {}", e);
            }
        }

        // 先归还许可，否则队列满时追加任务会与调度循环互相等待
        drop(permit);
        if let Some(next) = follow_up {
            self.chain_job(next).await;
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<()> {
        match job {
            Job::RunScanners { project, user } => {
                self.orchestrator.run_scanners(*project, *user).await?;
                Ok(())
            }
            Job::UpdateFromSource { project, user } => {
                self.orchestrator.update_from_source(*project, *user).await
            }
            Job::GitClone {
                git_url,
                destination,
                project,
                user,
            } => {
                self.orchestrator
                    .git_clone(git_url, destination, *project, *user)
                    .await
            }
        }
    }

    async fn chain_job(&self, job: Job) {
        let Some(tx) = self.chain.upgrade() else {
            tracing::warn!("Job queue gone, dropping chained {} job", job.kind());
            return;
        };
        let id = Uuid::new_v4();
        tracing::info!("Chaining {} job {} for project {}", job.kind(), id, job.project());
        if tx.send(Message::Run(QueuedJob { id, job })).await.is_err() {
            tracing::warn!("Job queue closed, chained job {} dropped", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_serializes_with_kind_tag() {
        let project = Uuid::new_v4();
        let job = Job::RunScanners { project, user: 7 };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["job"], "run_scanners");
        assert_eq!(value["user"], 7);

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn accessors_cover_every_variant() {
        let project = Uuid::new_v4();
        let clone = Job::GitClone {
            git_url: "https://example.com/repo.git".into(),
            destination: PathBuf::from("/tmp/repo"),
            project,
            user: 3,
        };
        assert_eq!(clone.kind(), "git_clone");
        assert_eq!(clone.project(), project);
        assert_eq!(clone.user(), 3);
    }
}
