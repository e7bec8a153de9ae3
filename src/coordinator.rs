//! Worker coordination
//!
//! Owns both sessions, runs one script worker per session on its own OS
//! thread, joins both and then drains both sessions.

use crate::config::SchedulingConfig;
use crate::error::{RbVaultError, Result};
use crate::sched;
use crate::script::{AbortSignal, ScriptWorker, WorkerReport};
use crate::session::{Sessions, SESSION_COUNT};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::thread;
use tracing::{error, info};

/// One script and the sink for its read results
#[derive(Debug)]
pub struct ScriptJob<R, W> {
    pub input: R,
    pub output: W,
}

impl<R, W> ScriptJob<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub workers: [WorkerReport; SESSION_COUNT],
    /// Entries left in each session and released by the final drain.
    pub drained: [usize; SESSION_COUNT],
}

/// Launches both workers and tears down the sessions afterwards
#[derive(Debug)]
pub struct Coordinator {
    scheduling: SchedulingConfig,
    sessions: Sessions,
}

impl Coordinator {
    pub fn new(scheduling: SchedulingConfig) -> Self {
        Self {
            scheduling,
            sessions: Sessions::new(),
        }
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Run both scripts in parallel and block until both finish.
    ///
    /// Both sessions are drained afterwards whatever the outcome. A fatal
    /// error in either worker stops the other before its next line, or wakes
    /// it from a delay, and is returned once teardown is done.
    ///
    /// Only the spawned worker threads get real-time priorities; the calling
    /// thread's scheduling is left as it was.
    pub fn run<R, W>(&self, jobs: [ScriptJob<R, W>; SESSION_COUNT]) -> Result<RunReport>
    where
        R: BufRead + Send,
        W: Write + Send,
    {
        let abort = AbortSignal::new();
        let results = self.run_workers(jobs, &abort);

        let drained = self.sessions.drain_all();
        info!(session1 = drained[0], session2 = drained[1], "sessions drained");

        let mut workers = Vec::with_capacity(SESSION_COUNT);
        let mut first_error = None;
        for result in results {
            match result {
                Ok(report) => workers.push(report),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            error!("run failed: {}", e);
            return Err(e);
        }

        let workers: [WorkerReport; SESSION_COUNT] = workers
            .try_into()
            .map_err(|_| RbVaultError::Worker("missing worker report".to_string()))?;
        info!(workers = SESSION_COUNT, "run complete");
        Ok(RunReport { workers, drained })
    }

    fn run_workers<R, W>(&self, jobs: [ScriptJob<R, W>; SESSION_COUNT], abort: &AbortSignal) -> Vec<Result<WorkerReport>>
    where
        R: BufRead + Send,
        W: Write + Send,
    {
        let sessions = &self.sessions;
        let scheduling = &self.scheduling;

        thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .into_iter()
                .enumerate()
                .map(|(index, job)| {
                    let worker = index + 1;
                    let name = format!("script-worker-{}", worker);
                    let priority = scheduling.worker_priorities[index];
                    let realtime = scheduling.realtime;
                    info!(worker, priority, "starting worker");

                    thread::Builder::new().name(name.clone()).spawn_scoped(scope, move || {
                        if realtime {
                            sched::apply_best_effort(&name, priority);
                        }
                        ScriptWorker::new(worker, sessions, abort, job.input, job.output).run()
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(RbVaultError::Worker(format!("worker {} panicked", index + 1)))
                    }),
                    Err(e) => Err(RbVaultError::Io(e)),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use std::time::{Duration, Instant};

    fn run(coordinator: &Coordinator, scripts: [&str; 2]) -> (Result<RunReport>, [String; 2]) {
        let mut out1 = Vec::new();
        let mut out2 = Vec::new();
        let result = coordinator.run([
            ScriptJob::new(scripts[0].as_bytes(), &mut out1),
            ScriptJob::new(scripts[1].as_bytes(), &mut out2),
        ]);
        (result, [String::from_utf8(out1).unwrap(), String::from_utf8(out2).unwrap()])
    }

    #[test]
    fn test_two_workers_run_and_drain() {
        let coordinator = Coordinator::new(SchedulingConfig::disabled());
        let (result, outputs) = run(
            &coordinator,
            [
                "w 1 1 one\nw 1 2 two\nw 1 3 thre\nr 1\n",
                "s 2 1\nw 2 8 ate\nw 2 4 for\nd 100\nr 2\nr 2\nr 2\n",
            ],
        );
        let report = result.unwrap();

        assert_eq!(outputs[0], "3: thre\n");
        assert_eq!(outputs[1], "4: for\n8: ate\n");
        assert_eq!(report.workers.len(), 2);
        assert_eq!(report.workers[1].empty_reads, 1);
        assert_eq!(report.drained, [2, 0]);

        let sessions = coordinator.sessions();
        assert!(sessions.lock(SessionId::FIRST).is_empty());
        assert!(sessions.lock(SessionId::SECOND).is_empty());
    }

    #[test]
    fn test_sessions_not_shared_between_workers() {
        let coordinator = Coordinator::new(SchedulingConfig::disabled());
        let (result, outputs) = run(&coordinator, ["w 1 7 sevn\nr 1\n", "d 2000\nr 2\n"]);
        result.unwrap();
        assert_eq!(outputs[0], "7: sevn\n");
        assert_eq!(outputs[1], "");
    }

    #[test]
    fn test_fatal_line_fails_run_and_still_drains() {
        let coordinator = Coordinator::new(SchedulingConfig::disabled());
        let (result, outputs) = run(&coordinator, ["w 1 1 aaaa\nx foo bar\nr 1\n", "w 2 1 bbbb\n"]);

        assert!(matches!(result, Err(RbVaultError::ScriptParse { line: 2, .. })));
        assert_eq!(outputs[0], "");
        assert!(coordinator.sessions().lock(SessionId::FIRST).is_empty());
        assert!(coordinator.sessions().lock(SessionId::SECOND).is_empty());
    }

    #[test]
    fn test_fatal_line_wakes_sleeping_worker() {
        let coordinator = Coordinator::new(SchedulingConfig::disabled());
        let start = Instant::now();
        let (result, outputs) = run(&coordinator, ["d 3000000\nw 1 1 late\nr 1\n", "x foo bar\n"]);

        assert!(start.elapsed() < Duration::from_secs(2), "run took {:?}", start.elapsed());
        assert!(matches!(result, Err(RbVaultError::ScriptParse { line: 1, .. })));
        // nothing after the delay ran
        assert_eq!(outputs[0], "");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_leaves_caller_scheduling_alone() {
        fn current_policy() -> libc::c_int {
            let mut policy = 0;
            let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
            let result = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
            assert_eq!(result, 0);
            policy
        }

        thread::spawn(|| {
            let before = current_policy();
            let coordinator = Coordinator::new(SchedulingConfig::default());
            let (result, outputs) = run(&coordinator, ["w 1 1 one\nr 1\n", "r 2\n"]);
            result.unwrap();
            assert_eq!(outputs[0], "1: one\n");
            assert_eq!(current_policy(), before);
        })
        .join()
        .unwrap();
    }
}
