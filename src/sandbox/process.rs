//! Child process lifecycle for one execution.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::capture::{drain, Capture};
use super::runtime::Runtime;
use super::{ExecutionResult, ExecutionStatus, SandboxLimits};

/// How long to wait for pipes to close after the process is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Spawn `code` under `runtime`, wait up to `budget`, and collect output.
pub(super) async fn run_isolated(
    runtime: &Runtime,
    code: &str,
    limits: &SandboxLimits,
    budget: Duration,
) -> ExecutionResult {
    let workdir = match tempfile::Builder::new().prefix("sandbox-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            return ExecutionResult::runtime_error(
                "",
                format!("Failed to create sandbox directory: {}", e),
            );
        }
    };

    let mut command = runtime.command(code, workdir.path());
    apply_limits(&mut command, limits, budget);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program = %runtime.program(), error = %e, "Failed to spawn interpreter");
            return ExecutionResult::runtime_error(
                "",
                format!("Failed to start interpreter '{}': {}", runtime.program(), e),
            );
        }
    };
    let pid = child.id();

    let stdout = Capture::new(limits.max_output_bytes);
    let stderr = Capture::new(limits.max_output_bytes);
    let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(pipe) = child.stdout.take() {
        readers.push(tokio::spawn(drain(pipe, stdout.clone())));
    }
    if let Some(pipe) = child.stderr.take() {
        readers.push(tokio::spawn(drain(pipe, stderr.clone())));
    }

    let (status, fault, reaped) = match tokio::time::timeout(budget, child.wait()).await {
        Ok(Ok(exit)) => {
            let (status, fault) = classify_exit(exit);
            (status, fault, true)
        }
        Ok(Err(e)) => (
            ExecutionStatus::RuntimeError,
            Some(format!("Failed to wait for process: {}", e)),
            false,
        ),
        Err(_) => {
            tracing::debug!(pid = ?pid, budget_ms = budget.as_millis() as u64, "Execution budget exceeded, killing");
            (
                ExecutionStatus::Timeout,
                Some(format!("Execution timed out after {} ms", budget.as_millis())),
                false,
            )
        }
    };

    // Reap anything the code left behind in its process group.
    terminate(&mut child, pid, reaped).await;
    finish_readers(readers).await;

    let mut stderr = stderr.contents();
    if let Some(fault) = fault {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&fault);
    }

    // Scratch directory is removed here, after the process group is gone.
    if let Err(e) = workdir.close() {
        tracing::debug!(error = %e, "Failed to remove sandbox directory");
    }

    ExecutionResult {
        stdout: stdout.contents(),
        stderr,
        status,
    }
}

fn classify_exit(exit: ExitStatus) -> (ExecutionStatus, Option<String>) {
    if exit.success() {
        return (ExecutionStatus::Ok, None);
    }
    if let Some(code) = exit.code() {
        return (
            ExecutionStatus::RuntimeError,
            Some(format!("Process exited with code {}", code)),
        );
    }
    (
        ExecutionStatus::RuntimeError,
        Some(describe_signal(exit)),
    )
}

#[cfg(unix)]
fn describe_signal(exit: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match exit.signal() {
        Some(libc::SIGXCPU) => "Process exceeded its CPU time limit".to_string(),
        Some(libc::SIGXFSZ) => "Process exceeded its file size limit".to_string(),
        Some(signal) => format!("Process terminated by signal {}", signal),
        None => "Process terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_exit: ExitStatus) -> String {
    "Process terminated abnormally".to_string()
}

async fn terminate(child: &mut Child, pid: Option<u32>, reaped: bool) {
    if let Some(pid) = pid {
        // Once the leader is reaped its pid no longer pins the group id, so
        // only signal a group that still has members.
        if !reaped || group_alive(pid) {
            kill_group(pid);
        }
    }
    if !reaped {
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "Failed to kill interpreter");
        }
    }
}

#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    // SAFETY: signal 0 only checks for the existence of group members.
    unsafe { libc::killpg(pgid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn group_alive(_pgid: u32) -> bool {
    false
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: killpg only delivers a signal. The group id equals the pid
    // because the child called setpgid(0, 0) before exec.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

async fn finish_readers(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
            // A descendant escaped the process group and still holds the pipe.
            reader.abort();
        }
    }
}

#[cfg(unix)]
fn apply_limits(command: &mut Command, limits: &SandboxLimits, budget: Duration) {
    let cpu_secs = budget.as_secs() + 1;
    let max_open_files = limits.max_open_files;
    let max_file_bytes = limits.max_file_bytes;
    let max_memory_bytes = limits.max_memory_bytes;

    // SAFETY: the closure runs between fork and exec and only calls
    // async-signal-safe libc functions without allocating.
    unsafe {
        command.pre_exec(move || {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            set_limit(libc::RLIMIT_CPU, cpu_secs)?;
            set_limit(libc::RLIMIT_NOFILE, max_open_files)?;
            set_limit(libc::RLIMIT_FSIZE, max_file_bytes)?;
            if let Some(bytes) = max_memory_bytes {
                set_limit(libc::RLIMIT_AS, bytes)?;
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_limits(_command: &mut Command, _limits: &SandboxLimits, _budget: Duration) {}

#[cfg(all(unix, target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;

#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: both calls receive valid pointers to stack-allocated rlimits.
    unsafe {
        if libc::getrlimit(resource, &mut current) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        // An unprivileged process cannot raise its hard limit.
        let value = (value as libc::rlim_t).min(current.rlim_max);
        let limit = libc::rlimit {
            rlim_cur: value,
            rlim_max: value,
        };
        if libc::setrlimit(resource, &limit) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn classify_exit_maps_codes_and_signals() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(classify_exit(ExitStatus::from_raw(0)), (ExecutionStatus::Ok, None));

        let (status, fault) = classify_exit(ExitStatus::from_raw(2 << 8));
        assert_eq!(status, ExecutionStatus::RuntimeError);
        assert_eq!(fault.as_deref(), Some("Process exited with code 2"));

        let (status, fault) = classify_exit(ExitStatus::from_raw(libc::SIGXCPU));
        assert_eq!(status, ExecutionStatus::RuntimeError);
        assert_eq!(fault.as_deref(), Some("Process exceeded its CPU time limit"));
    }

    #[cfg(target_os = "linux")]
    fn running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat.rsplit(") ").next().map_or(false, |rest| rest.starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn background_children_die_with_a_normal_exit() {
        let result = run_isolated(
            &Runtime::shell(),
            "sleep 30 >/dev/null 2>&1 & echo $!",
            &SandboxLimits::default(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result.status, ExecutionStatus::Ok);

        let pid: u32 = result.stdout.trim().parse().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while running(pid) {
            assert!(std::time::Instant::now() < deadline, "background process {} survived", pid);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[cfg(unix)]
    #[test]
    fn group_alive_reflects_members() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let pgid = child.id();
        assert!(group_alive(pgid));

        kill_group(pgid);
        child.wait().unwrap();
        assert!(!group_alive(pgid));
    }
}
