//! 외부 CLI 실행 헬퍼
//!
//! Terraform/AWS CLI 백엔드가 공통으로 사용합니다. stdout은 UTF-8 문자열로
//! 반환하고, 실패 시 stderr를 `BackendError::CommandFailed`에 담아
//! 재시도 분류기가 검사할 수 있게 합니다.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use infraprobe_core::error::BackendError;

/// 실행할 외부 명령
#[derive(Debug, Clone)]
pub(crate) struct CliCommand<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub current_dir: Option<&'a Path>,
    pub envs: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl<'a> CliCommand<'a> {
    pub fn new(program: &'a str, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            current_dir: None,
            envs: BTreeMap::new(),
            timeout,
        }
    }

    pub fn current_dir(mut self, dir: &'a Path) -> Self {
        self.current_dir = Some(dir);
        self
    }

    pub fn envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.envs = envs;
        self
    }

    /// 로그/에러에 쓰는 명령 이름 (플래그와 값은 제외)
    ///
    /// `-var` 값에 민감한 정보가 있을 수 있으므로 첫 플래그 이전까지만 포함합니다.
    pub fn display_name(&self) -> String {
        let mut name = self.program.to_owned();
        for arg in self.args.iter().take_while(|a| !a.starts_with('-')) {
            name.push(' ');
            name.push_str(arg);
        }
        name
    }

    /// 명령을 실행하고 stdout을 반환합니다.
    pub async fn run(self) -> Result<String, BackendError> {
        let command_name = self.display_name();
        debug!(command = %command_name, "running external command");

        let mut command = tokio::process::Command::new(self.program);
        command
            .args(&self.args)
            .envs(&self.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| BackendError::Spawn {
            program: self.program.to_owned(),
            reason: e.to_string(),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BackendError::Timeout {
                command: command_name.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| BackendError::Spawn {
                program: self.program.to_owned(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::CommandFailed {
                command: command_name,
                status: output.status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|e| BackendError::InvalidResponse(format!("{command_name}: stdout is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn display_name_stops_at_first_flag() {
        let cmd = CliCommand::new(
            "terraform",
            args(&["apply", "-input=false", "-var", "password=secret"]),
            Duration::from_secs(1),
        );
        assert_eq!(cmd.display_name(), "terraform apply");

        let cmd = CliCommand::new(
            "aws",
            args(&["ec2", "describe-instances", "--region", "us-west-2"]),
            Duration::from_secs(1),
        );
        assert_eq!(cmd.display_name(), "aws ec2 describe-instances");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = CliCommand::new(
            "infraprobe-definitely-not-installed",
            Vec::new(),
            Duration::from_secs(5),
        )
        .run()
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_captures_stderr() {
        let err = CliCommand::new(
            "sh",
            args(&["-c", "echo 'Error installing provider' >&2; exit 1"]),
            Duration::from_secs(5),
        )
        .run()
        .await
        .unwrap_err();
        match err {
            BackendError::CommandFailed { stderr, .. } => {
                assert_eq!(stderr, "Error installing provider");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn envs_and_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut envs = BTreeMap::new();
        envs.insert("AWS_DEFAULT_REGION".to_owned(), "us-west-2".to_owned());
        let out = CliCommand::new(
            "sh",
            args(&["-c", "printf '%s %s' \"$AWS_DEFAULT_REGION\" \"$(basename \"$PWD\")\""]),
            Duration::from_secs(5),
        )
        .current_dir(dir.path())
        .envs(envs)
        .run()
        .await
        .unwrap();

        let dir_name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(out, format!("us-west-2 {dir_name}"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let err = CliCommand::new("sh", args(&["-c", "sleep 5"]), Duration::from_millis(100))
            .run()
            .await
            .unwrap_err();
        match err {
            BackendError::Timeout { command, secs } => {
                assert_eq!(command, "sh");
                assert_eq!(secs, 0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
