//! Cooperative cross-process locking around cache writes (§4.4.1, §5, §9):
//! a lock file records the holder's pid so a dead holder's lock can be
//! reclaimed via a zero-signal liveness probe, plus an in-process mutex so
//! concurrent tasks in this process serialize without touching the
//! filesystem lock at all.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{ChromiumError, Result};

static IN_PROCESS_LOCK: Mutex<()> = Mutex::const_new(());

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Held for the duration of an asset fetch/verify/extract sequence for one
/// cache directory. Dropping it releases both the in-process mutex and the
/// on-disk lock file.
pub struct FileLockGuard {
    path: PathBuf,
    _in_process: tokio::sync::MutexGuard<'static, ()>,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the lock at `lock_path`, waiting up to 30s with bounded backoff.
/// A lock file whose recorded pid no longer exists is treated as stale and
/// reclaimed immediately rather than waited out.
pub async fn acquire(lock_path: &Path) -> Result<FileLockGuard> {
    let in_process = IN_PROCESS_LOCK.lock().await;
    let deadline = Instant::now() + WAIT_TIMEOUT;

    loop {
        match try_create_lock(lock_path) {
            Ok(()) => {
                return Ok(FileLockGuard {
                    path: lock_path.to_path_buf(),
                    _in_process: in_process,
                });
            }
            Err(_) if is_stale(lock_path) => {
                let _ = std::fs::remove_file(lock_path);
                continue;
            }
            Err(_) => {
                if Instant::now() >= deadline {
                    return Err(ChromiumError::client(format!(
                        "timed out waiting for asset cache lock {}",
                        lock_path.display()
                    )));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

fn try_create_lock(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    write!(file, "{}", std::process::id())?;
    Ok(())
}

#[cfg(unix)]
fn is_stale(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return true;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return true;
    };
    // kill(pid, 0) sends no signal; it only reports whether the process
    // exists and is reachable by this user.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        false
    } else {
        std::io::Error::last_os_error().raw_os_error() != Some(libc::EPERM)
    }
}

#[cfg(not(unix))]
fn is_stale(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_and_releases_lock_file() {
        let path = std::env::temp_dir().join(format!("chromium-lock-test-{}.lock", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let guard = acquire(&path).await.unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reclaims_lock_left_by_dead_process() {
        let path = std::env::temp_dir().join(format!("chromium-lock-stale-test-{}.lock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        // A pid that is extremely unlikely to be alive.
        std::fs::write(&path, "999999").unwrap();

        let guard = acquire(&path).await.unwrap();
        drop(guard);
        let _ = std::fs::remove_file(&path);
    }
}
