use hermes_core::{
    CommandRunner, HermesConfig, JobQueue, ProcessRunner, ScanOrchestrator, ScannerRegistry, Store,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db::{init_db, SqliteStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<ScannerRegistry>,
    pub config: Arc<HermesConfig>,
    pub jobs: JobQueue,
}

impl AppState {
    /// SQLite 存储 + 真实子进程执行器，返回任务调度循环的句柄
    pub async fn new(
        config: HermesConfig,
        database_url: &str,
    ) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let pool = init_db(database_url).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        Ok(Self::assemble(store, Arc::new(ProcessRunner::new()), config))
    }

    pub fn assemble(
        store: Arc<dyn Store>,
        runner: Arc<dyn CommandRunner>,
        config: HermesConfig,
    ) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(ScannerRegistry::with_defaults());
        let config = Arc::new(config);
        let orchestrator =
            ScanOrchestrator::new(store.clone(), registry.clone(), runner, config.clone());
        let (jobs, dispatcher) = JobQueue::start(orchestrator);

        let state = Self {
            store,
            registry,
            config,
            jobs,
        };
        (state, dispatcher)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use async_trait::async_trait;
    use hermes_core::error::Result;
    use hermes_core::{CommandLine, MemoryStore, ProcessOutput};

    /// 所有命令都以空结果成功返回
    pub struct QuietRunner;

    #[async_trait]
    impl CommandRunner for QuietRunner {
        async fn run(&self, cmd: &CommandLine) -> Result<ProcessOutput> {
            let stdout = if cmd.program == "git" { "" } else { "{}" };
            Ok(ProcessOutput::success(stdout))
        }
    }

    pub fn state(project_dir: &std::path::Path) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = HermesConfig::default().with_project_dir(project_dir);
        let (state, _dispatcher) = AppState::assemble(store.clone(), Arc::new(QuietRunner), config);
        (state, store)
    }
}
