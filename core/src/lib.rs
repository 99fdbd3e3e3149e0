// Hermes Core Library
// 扫描编排核心库：扫描器适配、进程执行、扫描编排、任务队列与结果导出

pub mod config;
pub mod export;
pub mod jobs;
pub mod locks;
pub mod model;
pub mod orchestrator;
pub mod scanner;
pub mod store;

// 重新导出常用类型
pub use config::HermesConfig;
pub use export::{ArchiveUser, ArchivedProject, ArchivedScan, ArchivedVulnerability, ScanArchive};
pub use jobs::{Job, JobQueue, JobStats};
pub use locks::ProjectLocks;
pub use model::{
    Notification, NotificationLevel, Project, ProjectAutomation, Scan, User, Vulnerability,
};
pub use orchestrator::{ScanOrchestrator, ScanOutcome, ScanReport};
pub use scanner::registry::ScannerRegistry;
pub use scanner::runner::{CommandLine, CommandRunner, ProcessOutput, ProcessRunner};
pub use scanner::{ScanContext, Scanner};
pub use store::{memory::MemoryStore, Store};

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoreError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),

        #[error("Parse error: {0}")]
        Parse(String),

        #[error("Command `{command}` exited with code {exit_code}")]
        Execution {
            command: String,
            exit_code: i32,
            output: Vec<u8>,
        },

        #[error("Failed to spawn `{command}`: {source}")]
        Spawn {
            command: String,
            #[source]
            source: std::io::Error,
        },

        #[error("Job timed out after {0} seconds")]
        Timeout(u64),

        #[error("Unknown scanner: {0}")]
        UnknownScanner(String),

        #[error("Precondition failed: {0}")]
        Precondition(String),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Store error: {0}")]
        Store(String),

        #[error("Job queue is closed")]
        QueueClosed,
    }

    impl CoreError {
        /// 进程输出（仅执行错误携带）
        pub fn captured_output(&self) -> Option<&[u8]> {
            match self {
                CoreError::Execution { output, .. } => Some(output),
                _ => None,
            }
        }
    }

    pub type Result<T> = std::result::Result<T, CoreError>;
}
