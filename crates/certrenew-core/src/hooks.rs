//! Post-renewal hook runner
//!
//! Hooks are shell command lines executed through `sh -c` after a
//! certificate has been written. They run one after another; a failing
//! hook is logged and never stops the remaining hooks.
//!
//! The hook's stderr is redirected into its stdout, so the captured output
//! keeps the order in which the command wrote it.

use tokio::process::Command;
use tracing::{error, info};

/// Result of one hook invocation
#[derive(Debug, Clone)]
pub struct HookResult {
    /// The command line as configured
    pub command: String,
    /// Exit code, `None` if the process could not be spawned or was killed
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, in the order they were written
    pub output: String,
    /// Whether the hook exited successfully
    pub success: bool,
}

/// Run a single hook
pub async fn run_hook(command: &str) -> HookResult {
    let script = format!("exec 2>&1\n{}", command);

    match Command::new("sh").arg("-c").arg(&script).output().await {
        Ok(output) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            HookResult {
                command: command.to_string(),
                exit_code: output.status.code(),
                output: combined,
                success: output.status.success(),
            }
        }
        Err(e) => HookResult {
            command: command.to_string(),
            exit_code: None,
            output: format!("failed to spawn: {}", e),
            success: false,
        },
    }
}

/// Run every hook in order, logging each outcome
pub async fn run_hooks(domain: &str, hooks: &[String]) -> Vec<HookResult> {
    let mut results = Vec::with_capacity(hooks.len());

    for hook in hooks {
        let result = run_hook(hook).await;

        if result.success {
            info!(
                domain = %domain,
                hook = %hook,
                output = %result.output.trim_end(),
                "Post-renew hook succeeded"
            );
        } else {
            error!(
                domain = %domain,
                hook = %hook,
                exit_code = ?result.exit_code,
                output = %result.output.trim_end(),
                "Post-renew hook failed"
            );
        }

        results.push(result);
    }

    results
}
