//! Script - runs shell code in a child process
//!
//! The child gets a cleared environment with only `PATH` and the run data:
//!
//! - `JOBFLOW_JOB_ID`
//! - `JOBFLOW_VARIABLES` (JSON object of run variables merged with the job's own)
//! - `JOBFLOW_RESULTS` (JSON object of prior job results keyed by job id)
//! - `JOBFLOW_VAR_<NAME>` for each scalar variable
//!
//! The last stdout line that parses as JSON becomes the job's `output`.

use super::JobContext;
use crate::core::ScriptAttrs;
use crate::error::JobExecutionError;
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

const HANDLER: &str = "script";
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

pub(super) async fn execute(
    attrs: &ScriptAttrs,
    ctx: &mut JobContext,
) -> Result<Value, JobExecutionError> {
    match attrs.language.to_ascii_lowercase().as_str() {
        "shell" | "sh" => {}
        other => return Err(JobExecutionError::UnsupportedLanguage(other.to_string())),
    }
    if attrs.code.trim().is_empty() {
        return Err(JobExecutionError::invalid(HANDLER, "code is empty"));
    }

    let timeout_ms = attrs.timeout_ms.unwrap_or(ctx.config.script_timeout_ms);
    let mut variables = ctx.variables.clone();
    variables.extend(attrs.variables.clone());

    let mut command = Command::new(&ctx.config.shell);
    command
        .arg("-c")
        .arg(&attrs.code)
        .env_clear()
        .env(
            "PATH",
            std::env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string()),
        )
        .env("JOBFLOW_JOB_ID", &ctx.job_id)
        .env("JOBFLOW_VARIABLES", Value::Object(variables.clone()).to_string())
        .env("JOBFLOW_RESULTS", Value::Object(ctx.results.clone()).to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (name, value) in &variables {
        if let Some(text) = scalar_text(value) {
            command.env(format!("JOBFLOW_VAR_{}", env_name(name)), text);
        }
    }

    log::debug!("Spawning {} -c for job {}", ctx.config.shell, ctx.job_id);
    let mut child = command
        .spawn()
        .map_err(|e| JobExecutionError::ScriptSpawn(e.to_string()))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let wait = child.wait();
    let run = async move { tokio::join!(read_lines(stdout), read_lines(stderr), wait) };

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), run) => Some(outcome),
    };

    let (stdout_lines, stderr_lines, status) = match outcome {
        None => {
            let _ = child.start_kill();
            return Err(JobExecutionError::Cancelled(HANDLER));
        }
        Some(Err(_)) => {
            let _ = child.start_kill();
            return Err(JobExecutionError::Timeout {
                handler: HANDLER,
                timeout_ms,
            });
        }
        Some(Ok(parts)) => parts,
    };
    let status = status.map_err(|e| JobExecutionError::ScriptSpawn(e.to_string()))?;

    for line in &stdout_lines {
        ctx.log(line.clone());
    }
    for line in &stderr_lines {
        ctx.log(format!("stderr: {}", line));
    }

    if !status.success() {
        return Err(JobExecutionError::ScriptFailed {
            code: status.code().unwrap_or(-1),
            stderr: stderr_lines.join("\n"),
        });
    }

    let output = stdout_lines
        .iter()
        .rev()
        .find_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .unwrap_or(Value::Null);

    Ok(json!({
        "exitCode": status.code().unwrap_or(0),
        "output": output,
        "stdout": stdout_lines.join("\n"),
    }))
}

async fn read_lines<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<String> {
    let Some(pipe) = pipe else {
        return Vec::new();
    };
    let mut lines = BufReader::new(pipe).lines();
    let mut collected = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        collected.push(line);
    }
    collected
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `user-id` -> `USER_ID`
fn env_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::Arc;
    use std::time::Instant;

    fn context() -> JobContext {
        JobContext::new("script", Arc::new(EngineConfig::default()))
    }

    fn shell(code: &str) -> ScriptAttrs {
        ScriptAttrs {
            code: code.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stdout_and_json_output() {
        let mut ctx = context();
        let result = execute(&shell("echo working; echo '{\"total\": 3}'"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["exitCode"], 0);
        assert_eq!(result["output"]["total"], 3);
        assert_eq!(ctx.logs(), ["working", "{\"total\": 3}"]);
    }

    #[tokio::test]
    async fn test_environment_is_cleared_and_populated() {
        std::env::set_var("JOBFLOW_TEST_SECRET", "leak");
        let mut ctx = context();
        ctx.variables.insert("user-id".into(), json!(42));
        ctx.results.insert("start".into(), json!({ "ok": true }));

        let code = "echo \"$JOBFLOW_VAR_USER_ID|$JOBFLOW_JOB_ID|${JOBFLOW_TEST_SECRET:-none}\"; echo \"$JOBFLOW_RESULTS\"";
        let result = execute(&shell(code), &mut ctx).await.unwrap();
        assert_eq!(ctx.logs()[0], "42|script|none");
        assert_eq!(result["output"]["start"]["ok"], true);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let mut ctx = context();
        let err = execute(&shell("echo broken >&2; exit 3"), &mut ctx)
            .await
            .unwrap_err();
        match err {
            JobExecutionError::ScriptFailed { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.logs(), ["stderr: broken"]);
    }

    #[tokio::test]
    async fn test_infinite_loop_is_killed() {
        let mut ctx = context();
        let attrs = ScriptAttrs {
            code: "while true; do :; done".into(),
            timeout_ms: Some(300),
            ..Default::default()
        };
        let started = Instant::now();
        let err = execute(&attrs, &mut ctx).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let mut ctx = context();
        let attrs = ScriptAttrs {
            language: "javascript".into(),
            code: "console.log(1)".into(),
            ..Default::default()
        };
        let err = execute(&attrs, &mut ctx).await.unwrap_err();
        assert!(matches!(err, JobExecutionError::UnsupportedLanguage(lang) if lang == "javascript"));
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("user-id"), "USER_ID");
        assert_eq!(env_name("apiKey"), "APIKEY");
    }
}
