// 子进程执行：运行命令、捕获输出并按适配器策略判定退出码

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{CoreError, Result};

/// argv 风格的命令行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// 完整 argv，program 在首位
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// 被信号终止时为 -1
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// stdout 与 stderr 合并，用于诊断
    pub fn combined(&self) -> Vec<u8> {
        let mut out = self.stdout.clone();
        out.extend_from_slice(&self.stderr);
        out
    }
}

/// 命令执行器 - 方便在测试中替换
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &CommandLine) -> Result<ProcessOutput>;
}

/// 基于 tokio::process 的默认执行器
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cmd: &CommandLine) -> Result<ProcessOutput> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // 任务超时后 future 被丢弃，子进程随之终止
            .kill_on_drop(true);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        tracing::debug!("Running `{}`", cmd);
        let output = command.output().await.map_err(|e| CoreError::Spawn {
            command: cmd.to_string(),
            source: e,
        })?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// 执行命令，`accepts` 不接受的退出码返回执行错误并附带输出
pub async fn run_checked<F>(
    runner: &dyn CommandRunner,
    cmd: &CommandLine,
    accepts: F,
) -> Result<ProcessOutput>
where
    F: Fn(i32) -> bool,
{
    let output = runner.run(cmd).await?;
    if accepts(output.exit_code) {
        Ok(output)
    } else {
        Err(CoreError::Execution {
            command: cmd.to_string(),
            exit_code: output.exit_code,
            output: output.combined(),
        })
    }
}

/// 默认策略：0 与 1 都视为成功
pub fn zero_or_one(code: i32) -> bool {
    code == 0 || code == 1
}

pub fn zero_only(code: i32) -> bool {
    code == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn exit_code_one_is_success_with_output() {
        let runner = ProcessRunner::new();
        let out = run_checked(&runner, &sh("printf found; exit 1"), zero_or_one)
            .await
            .unwrap();
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stdout, b"found");
    }

    #[tokio::test]
    async fn other_exit_codes_carry_captured_output() {
        let runner = ProcessRunner::new();
        let err = run_checked(&runner, &sh("printf out; printf err >&2; exit 2"), zero_or_one)
            .await
            .unwrap_err();
        match err {
            CoreError::Execution {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, 2);
                assert_eq!(output, b"outerr");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let runner = ProcessRunner::new();
        let err = runner
            .run(&CommandLine::new("definitely-not-a-real-tool-4821"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Spawn { .. }));
    }

    #[tokio::test]
    async fn honours_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new();
        let out = runner
            .run(&CommandLine::new("pwd").current_dir(dir.path()))
            .await
            .unwrap();
        let printed = String::from_utf8(out.stdout).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(printed.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_future_kills_the_child() {
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
        let runner = ProcessRunner::new();

        let result =
            tokio::time::timeout(Duration::from_millis(500), runner.run(&sh(&script))).await;
        assert!(result.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = format!("/proc/{}/stat", pid);
        let mut gone = false;
        for _ in 0..200 {
            // 已退出未回收的进程状态为 Z
            gone = match std::fs::read_to_string(&stat) {
                Err(_) => true,
                Ok(s) => s
                    .rsplit(')')
                    .next()
                    .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            };
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gone, "sleep {} still running after timeout", pid);
    }

    #[test]
    fn display_joins_argv() {
        let cmd = CommandLine::new("bandit").args(["-r", "/p", "-f", "json"]);
        assert_eq!(cmd.to_string(), "bandit -r /p -f json");
    }
}
