//! Fixed real-time priorities for the coordinator and worker threads.
//!
//! Priorities only keep script processing from being starved by unrelated
//! load. No command outcome depends on them, so callers log failures (an
//! unprivileged process gets `EPERM`) and carry on.

use crate::error::{RbVaultError, Result};

/// Lowest and highest `SCHED_FIFO` priority accepted by configuration.
pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 99;

/// Switch the calling thread to `SCHED_FIFO` at `priority`.
#[cfg(target_os = "linux")]
pub fn set_current_thread_priority(priority: i32) -> Result<()> {
    use std::mem;

    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(RbVaultError::Scheduling(format!(
            "priority {} outside {}..={}",
            priority, MIN_PRIORITY, MAX_PRIORITY
        )));
    }

    unsafe {
        let mut param: libc::sched_param = mem::zeroed();
        param.sched_priority = priority;

        let result = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);

        if result == 0 {
            Ok(())
        } else {
            Err(RbVaultError::Scheduling(format!(
                "pthread_setschedparam(SCHED_FIFO, {}) failed: {}",
                priority,
                std::io::Error::from_raw_os_error(result)
            )))
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_priority(priority: i32) -> Result<()> {
    tracing::debug!(priority, "real-time priorities not supported on this platform");
    Ok(())
}

/// Apply `priority` to the current thread, logging instead of failing.
pub fn apply_best_effort(thread: &str, priority: i32) -> bool {
    match set_current_thread_priority(priority) {
        Ok(()) => {
            tracing::debug!(thread, priority, "real-time priority applied");
            true
        }
        Err(e) => {
            tracing::warn!(thread, priority, "continuing without real-time priority: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_out_of_range_priority_rejected() {
        assert!(matches!(set_current_thread_priority(0), Err(RbVaultError::Scheduling(_))));
        assert!(matches!(set_current_thread_priority(100), Err(RbVaultError::Scheduling(_))));
    }

    #[test]
    fn test_best_effort_never_panics() {
        // Succeeds as root, logs EPERM otherwise; run on a throwaway thread so
        // the test harness thread keeps its normal policy.
        std::thread::spawn(|| {
            apply_best_effort("test", 10);
        })
        .join()
        .unwrap();
    }
}
