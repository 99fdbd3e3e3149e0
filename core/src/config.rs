use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// 运行时配置，启动时构造一次，之后以引用传递
#[derive(Debug, Clone)]
pub struct HermesConfig {
    /// 项目源码存放目录
    pub project_dir: PathBuf,

    /// 同时执行的任务数上限
    pub job_concurrency: usize,

    /// 单个任务的超时时间
    pub job_timeout: Duration,

    /// 任务队列容量
    pub queue_capacity: usize,

    /// Semgrep 代码片段回退时，报告行之前的行数
    pub snippet_context_before: usize,

    /// Semgrep 代码片段回退时，报告行之后的行数
    pub snippet_context_after: usize,
}

impl Default for HermesConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from(".projects"),
            job_concurrency: 10,
            job_timeout: Duration::from_secs(2 * 60 * 60),
            queue_capacity: 128,
            snippet_context_before: 2,
            snippet_context_after: 4,
        }
    }
}

impl HermesConfig {
    /// 从环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("PROJECT_DIR") {
            cfg.project_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("HERMES_JOB_CONCURRENCY") {
            cfg.job_concurrency = parse_var("HERMES_JOB_CONCURRENCY", &v)?;
        }
        if let Ok(v) = env::var("HERMES_JOB_TIMEOUT_SECS") {
            cfg.job_timeout = Duration::from_secs(parse_var("HERMES_JOB_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = env::var("HERMES_QUEUE_CAPACITY") {
            cfg.queue_capacity = parse_var("HERMES_QUEUE_CAPACITY", &v)?;
        }

        if cfg.job_concurrency == 0 {
            return Err(CoreError::Parse(
                "HERMES_JOB_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(cfg)
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// 确保项目目录存在
    pub fn ensure_project_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.project_dir)?;
        Ok(&self.project_dir)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Parse(format!("invalid value for {}: {:?}", name, raw)))
}
