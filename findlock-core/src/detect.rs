//! Lock-contention deadlock detection.
//!
//! Heuristic, not a proof: goroutines waiting on a lock are grouped by the
//! address of the lock they wait for, and every group is reported as a
//! possible deadlock. No wait-for graph is built.
//!
//! Steps:
//! 1. keep entries whose state is a wait state (see [`RecognitionTable`])
//! 2. find the innermost lock-acquire frame of each
//! 3. take the lock token from that frame's first argument (the receiver)
//! 4. group by token, in first-seen order
//! 5. collapse waiters with byte-identical call-stack shapes

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DetectionFailure, DetectionLogicError};
use crate::recognize::RecognitionTable;
use crate::trace::{Call, Entry, Trace};

/// Where a goroutine asked for the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub name: String,
    pub filename: String,
    pub line: u32,
}

impl From<&Call> for CallSite {
    fn from(call: &Call) -> Self {
        Self {
            name: call.name.clone(),
            filename: call.filename.clone(),
            line: call.line,
        }
    }
}

/// Waiters of one group sharing a call-stack shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniquePattern {
    /// Acquire site of the first waiter with this shape
    pub acquire_site: CallSite,
    /// Full stack of the first waiter with this shape
    pub call_stack: Vec<Call>,
    /// Number of waiters with this shape
    pub waiters: usize,
    /// Goroutine numbers of those waiters, when the dump printed them
    pub goroutines: Vec<u64>,
}

/// Goroutines waiting on the same lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockGroup {
    /// Lock address as printed in the dump
    pub token: String,
    pub total_waiters: usize,
    pub unique_patterns: Vec<UniquePattern>,
}

/// Detector output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Entries whose state looked like a lock wait
    pub wait_candidates: usize,
    /// One group per distinct lock token, in first-seen order
    pub groups: Vec<LockGroup>,
    /// Wait entries that could not be attributed to a lock
    pub issues: Vec<DetectionLogicError>,
}

impl Report {
    /// True when no entry was in a wait state at all.
    pub fn no_locks_detected(&self) -> bool {
        self.wait_candidates == 0
    }

    /// Number of distinct lock tokens.
    pub fn possible_deadlocks(&self) -> usize {
        self.groups.len()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Runs detection with the built-in recognition rules.
pub fn detect(trace: &Trace) -> Report {
    Detector::new(&RecognitionTable::classic()).detect(trace)
}

/// Deadlock detector bound to a recognition table.
pub struct Detector<'t> {
    table: &'t RecognitionTable,
}

/// A wait entry resolved to its lock.
struct Waiter<'a> {
    entry: &'a Entry,
    token: String,
    acquire_site: CallSite,
}

impl<'t> Detector<'t> {
    pub fn new(table: &'t RecognitionTable) -> Self {
        Self { table }
    }

    pub fn detect(&self, trace: &Trace) -> Report {
        let candidates = self.table.wait_candidates(trace);

        if candidates.is_empty() {
            debug!(entries = trace.len(), "no wait-state entries");
            return Report::default();
        }

        let mut grouped: Vec<(String, Vec<Waiter<'_>>)> = Vec::new();
        let mut by_token: HashMap<String, usize> = HashMap::new();
        let mut issues = Vec::new();

        for &(index, entry) in &candidates {
            match self.resolve(index, entry) {
                Ok(waiter) => match by_token.get(&waiter.token) {
                    Some(&slot) => grouped[slot].1.push(waiter),
                    None => {
                        by_token.insert(waiter.token.clone(), grouped.len());
                        grouped.push((waiter.token.clone(), vec![waiter]));
                    }
                },
                Err(issue) => {
                    warn!(entry = index, line = issue.line, %issue, "wait entry skipped");
                    issues.push(issue);
                }
            }
        }

        let groups: Vec<LockGroup> = grouped
            .into_iter()
            .map(|(token, waiters)| {
                let total_waiters = waiters.len();
                let unique_patterns = dedup_by_shape(waiters);
                debug!(%token, total_waiters, unique = unique_patterns.len(), "lock group");
                LockGroup {
                    token,
                    total_waiters,
                    unique_patterns,
                }
            })
            .collect();

        Report {
            wait_candidates: candidates.len(),
            groups,
            issues,
        }
    }

    fn resolve<'a>(
        &self,
        index: usize,
        entry: &'a Entry,
    ) -> Result<Waiter<'a>, DetectionLogicError> {
        let issue = |reason| DetectionLogicError {
            entry_index: index,
            goroutine: entry.id,
            line: entry.header_line,
            reason,
        };

        let lock_idx = self.table.find_lock_frame(&entry.calls).ok_or_else(|| {
            issue(DetectionFailure::NoLockFrame {
                state: entry.state.clone(),
            })
        })?;
        let lock_frame = &entry.calls[lock_idx];

        let token = lock_frame.first_arg().ok_or_else(|| {
            issue(DetectionFailure::MissingToken {
                function: lock_frame.name.clone(),
            })
        })?;

        // The acquire site is the frame that called into the lock, one step
        // further out. When the lock frame is the outermost frame recorded
        // there is no caller, and the lock frame itself stands in. That
        // fallback is unverified against real dumps.
        let acquire = entry.calls.get(lock_idx + 1).unwrap_or(lock_frame);

        Ok(Waiter {
            entry,
            token: token.to_string(),
            acquire_site: CallSite::from(acquire),
        })
    }
}

/// Keeps the first waiter of each distinct flattened stack.
fn dedup_by_shape(waiters: Vec<Waiter<'_>>) -> Vec<UniquePattern> {
    let mut shapes: Vec<String> = Vec::new();
    let mut patterns: Vec<UniquePattern> = Vec::new();

    for waiter in waiters {
        let shape = waiter.entry.flatten();
        match shapes.iter().position(|s| *s == shape) {
            Some(i) => {
                patterns[i].waiters += 1;
                patterns[i].goroutines.extend(waiter.entry.id);
            }
            None => {
                shapes.push(shape);
                patterns.push(UniquePattern {
                    acquire_site: waiter.acquire_site,
                    call_stack: waiter.entry.calls.clone(),
                    waiters: 1,
                    goroutines: waiter.entry.id.into_iter().collect(),
                });
            }
        }
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::LockFrameRule;

    fn call(name: &str, file: &str, line: u32, args: &[&str]) -> Call {
        Call {
            name: name.into(),
            filename: file.into(),
            line,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn waiting(id: u64, token: &str, caller_line: u32) -> Entry {
        Entry {
            id: Some(id),
            state: "semacquire".into(),
            calls: vec![
                call(
                    "sync.runtime_Semacquire",
                    "/go/src/runtime/sema.go",
                    47,
                    &["0xc0000a0004"],
                ),
                call("sync.(*RWMutex).Lock", "/go/src/sync/rwmutex.go", 82, &[token]),
                call("main.worker", "/app/main.go", caller_line, &["0x1"]),
            ],
            header_line: id as usize * 10,
            ..Entry::default()
        }
    }

    fn trace(entries: Vec<Entry>) -> Trace {
        Trace { entries }
    }

    #[test]
    fn test_no_wait_entries() {
        let running = Entry {
            state: "running".into(),
            ..Entry::default()
        };
        let report = detect(&trace(vec![running]));
        assert!(report.no_locks_detected());
        assert_eq!(report.possible_deadlocks(), 0);
        assert!(!report.has_issues());
    }

    #[test]
    fn test_same_token_same_shape() {
        let report = detect(&trace(vec![
            waiting(1, "0xc0000a0000", 14),
            waiting(2, "0xc0000a0000", 14),
        ]));
        assert_eq!(report.possible_deadlocks(), 1);
        let group = &report.groups[0];
        assert_eq!(group.token, "0xc0000a0000");
        assert_eq!(group.total_waiters, 2);
        assert_eq!(group.unique_patterns.len(), 1);
        assert_eq!(group.unique_patterns[0].waiters, 2);
        assert_eq!(group.unique_patterns[0].goroutines, vec![1, 2]);
    }

    #[test]
    fn test_same_token_different_shape() {
        let report = detect(&trace(vec![
            waiting(1, "0xc0000a0000", 14),
            waiting(2, "0xc0000a0000", 15),
        ]));
        let group = &report.groups[0];
        assert_eq!(group.total_waiters, 2);
        assert_eq!(group.unique_patterns.len(), 2);
        assert_eq!(group.unique_patterns[1].acquire_site.line, 15);
    }

    #[test]
    fn test_acquire_site_is_caller() {
        let report = detect(&trace(vec![waiting(1, "0xc0000a0000", 14)]));
        let site = &report.groups[0].unique_patterns[0].acquire_site;
        assert_eq!(site.name, "main.worker");
        assert_eq!(site.filename, "/app/main.go");
        assert_eq!(site.line, 14);
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let tokens = ["0xc000300000", "0xc000100000", "0xc000200000", "0xc000100000"];
        let entries = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| waiting(i as u64 + 1, t, 14))
            .collect();
        let report = detect(&trace(entries));
        let order: Vec<&str> = report.groups.iter().map(|g| g.token.as_str()).collect();
        assert_eq!(order, vec!["0xc000300000", "0xc000100000", "0xc000200000"]);
        assert_eq!(report.groups[1].total_waiters, 2);
    }

    #[test]
    fn test_outermost_lock_frame_falls_back_to_itself() {
        let entry = Entry {
            id: Some(4),
            state: "semacquire".into(),
            calls: vec![call(
                "sync.(*RWMutex).RLock",
                "/go/src/sync/rwmutex.go",
                50,
                &["0xc000123000"],
            )],
            ..Entry::default()
        };
        let report = detect(&trace(vec![entry]));
        let pattern = &report.groups[0].unique_patterns[0];
        assert_eq!(report.groups[0].token, "0xc000123000");
        assert_eq!(pattern.acquire_site.name, "sync.(*RWMutex).RLock");
        assert_eq!(pattern.acquire_site.line, 50);
    }

    #[test]
    fn test_missing_lock_frame_is_issue_not_abort() {
        let stray = Entry {
            id: Some(9),
            state: "semacquire".into(),
            calls: vec![call(
                "sync.(*WaitGroup).Wait",
                "/go/src/sync/waitgroup.go",
                130,
                &["0x1"],
            )],
            header_line: 77,
            ..Entry::default()
        };
        let report = detect(&trace(vec![waiting(1, "0xc0000a0000", 14), stray]));
        assert_eq!(report.wait_candidates, 2);
        assert_eq!(report.possible_deadlocks(), 1);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.entry_index, 1);
        assert_eq!(issue.goroutine, Some(9));
        assert_eq!(issue.line, 77);
        assert!(matches!(issue.reason, DetectionFailure::NoLockFrame { .. }));
    }

    #[test]
    fn test_lock_frame_without_args_is_issue() {
        let entry = Entry {
            state: "semacquire".into(),
            calls: vec![call("sync.(*RWMutex).Lock", "/go/src/sync/rwmutex.go", 82, &[])],
            ..Entry::default()
        };
        let report = detect(&trace(vec![entry]));
        assert!(!report.no_locks_detected());
        assert!(report.groups.is_empty());
        assert!(matches!(
            report.issues[0].reason,
            DetectionFailure::MissingToken { .. }
        ));
    }

    #[test]
    fn test_custom_table() {
        let table = RecognitionTable::empty()
            .with_wait_state("sync.Mutex.Lock")
            .with_lock_frame(LockFrameRule::new(r"\(\*Mutex\)\.Lock", r"mutex\.go").unwrap());
        let entry = Entry {
            state: "sync.Mutex.Lock".into(),
            calls: vec![
                call("sync.(*Mutex).Lock", "/go/src/sync/mutex.go", 90, &["0xc000777000"]),
                call("main.run", "/app/main.go", 5, &[]),
            ],
            ..Entry::default()
        };
        let report = Detector::new(&table).detect(&trace(vec![entry.clone()]));
        assert_eq!(report.groups[0].token, "0xc000777000");
        assert!(detect(&trace(vec![entry])).no_locks_detected());
    }
}
