//! Child termination helpers.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// Ask the child to exit, then force it once `grace` has elapsed.
#[cfg(unix)]
pub(crate) async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    if let Some(pid) = child.id() {
        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => return status,
                Err(_) => tracing::warn!(pid, grace_ms = grace.as_millis() as u64, "Child ignored SIGTERM, killing"),
            }
        }
    }

    child.kill().await?;
    child.wait().await
}

#[cfg(not(unix))]
pub(crate) async fn terminate(child: &mut Child, _grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    child.kill().await?;
    child.wait().await
}

/// Signal that terminated the process, if any.
#[cfg(unix)]
pub(crate) fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub(crate) fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_terminate_polite_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let status = terminate(&mut child, Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
        assert_eq!(exit_signal(&status), Some(15));
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_sigterm_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; exec sleep 30")
            .spawn()
            .unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = terminate(&mut child, Duration::from_millis(200)).await.unwrap();
        assert_eq!(exit_signal(&status), Some(9));
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();
        let status = terminate(&mut child, Duration::from_millis(100)).await.unwrap();
        assert!(status.success());
    }
}
