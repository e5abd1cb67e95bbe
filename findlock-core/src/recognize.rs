//! Recognition table for lock waits.
//!
//! The detector never hardcodes runtime symbol names. It asks this table two
//! questions: does a goroutine state look like a lock wait, and which frame
//! of a stack is the lock acquisition. The built-in rules are the classic
//! ones for Go dumps:
//!
//! | question            | rule                                            |
//! |---------------------|-------------------------------------------------|
//! | wait state          | state contains `semacquire`                     |
//! | lock-acquire frame  | function contains `Lock` (so also `RLock`) and  |
//! |                     | file matches `rwmutex.go`                       |
//!
//! Newer dump formats can be supported by extending the table, usually from
//! `findlock.toml`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::FindlockConfig;
use crate::error::{FindlockError, FindlockResult};
use crate::trace::{Call, Entry, Trace};

/// State substring of goroutines parked on a semaphore.
pub const DEFAULT_WAIT_STATE: &str = "semacquire";

/// Function pattern of the built-in lock-acquire rule.
pub const DEFAULT_LOCK_FUNCTION: &str = "Lock";

/// File pattern of the built-in lock-acquire rule.
pub const DEFAULT_LOCK_FILE: &str = r"rwmutex\.go";

/// Recognises a lock-acquire frame by function name and source file.
#[derive(Debug, Clone)]
pub struct LockFrameRule {
    function: Regex,
    file: Regex,
}

impl LockFrameRule {
    pub fn new(function: &str, file: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            function: Regex::new(function)?,
            file: Regex::new(file)?,
        })
    }

    /// The built-in `Lock`/`RLock` in `rwmutex.go` rule.
    pub fn classic() -> Self {
        static RULE: OnceLock<LockFrameRule> = OnceLock::new();
        RULE.get_or_init(|| {
            LockFrameRule::new(DEFAULT_LOCK_FUNCTION, DEFAULT_LOCK_FILE)
                .expect("Hardcoded regex pattern is valid")
        })
        .clone()
    }

    pub fn matches(&self, call: &Call) -> bool {
        self.function.is_match(&call.name) && self.file.is_match(&call.filename)
    }

    pub fn function_pattern(&self) -> &str {
        self.function.as_str()
    }

    pub fn file_pattern(&self) -> &str {
        self.file.as_str()
    }
}

/// Wait-state markers and lock-acquire frame rules.
#[derive(Debug, Clone)]
pub struct RecognitionTable {
    wait_states: Vec<String>,
    lock_frames: Vec<LockFrameRule>,
}

impl Default for RecognitionTable {
    fn default() -> Self {
        Self::classic()
    }
}

impl RecognitionTable {
    /// The built-in rules.
    pub fn classic() -> Self {
        Self {
            wait_states: vec![DEFAULT_WAIT_STATE.to_string()],
            lock_frames: vec![LockFrameRule::classic()],
        }
    }

    /// A table that recognises nothing.
    pub fn empty() -> Self {
        Self {
            wait_states: Vec::new(),
            lock_frames: Vec::new(),
        }
    }

    pub fn with_wait_state(mut self, marker: impl Into<String>) -> Self {
        self.wait_states.push(marker.into());
        self
    }

    pub fn with_lock_frame(mut self, rule: LockFrameRule) -> Self {
        self.lock_frames.push(rule);
        self
    }

    /// Builds the table described by a config file.
    ///
    /// `origin` is only used to label errors.
    pub fn from_config(cfg: &FindlockConfig, origin: &Path) -> FindlockResult<Self> {
        let mut table = if cfg.replace_defaults {
            Self::empty()
        } else {
            Self::classic()
        };

        for marker in cfg.wait_states.iter().flatten() {
            if marker.is_empty() {
                return Err(FindlockError::config(origin, "empty wait state marker"));
            }
            table = table.with_wait_state(marker.clone());
        }

        for frame in cfg.lock_frames.iter().flatten() {
            let rule = LockFrameRule::new(&frame.function, &frame.file).map_err(|e| {
                FindlockError::config(
                    origin,
                    format!(
                        "invalid lock frame rule `{}` / `{}`: {}",
                        frame.function, frame.file, e
                    ),
                )
            })?;
            table = table.with_lock_frame(rule);
        }

        Ok(table)
    }

    pub fn wait_states(&self) -> &[String] {
        &self.wait_states
    }

    pub fn lock_frames(&self) -> &[LockFrameRule] {
        &self.lock_frames
    }

    /// Entries in a lock-wait state, in dump order.
    ///
    /// An entry matching several markers is returned once.
    pub fn wait_candidates<'a>(&self, trace: &'a Trace) -> Vec<(usize, &'a Entry)> {
        let mut hits: BTreeMap<usize, &'a Entry> = BTreeMap::new();
        for marker in &self.wait_states {
            hits.extend(trace.query(marker));
        }
        hits.into_iter().collect()
    }

    /// Index of the innermost lock-acquire frame.
    ///
    /// Frames are most recent first, so this is the first match.
    pub fn find_lock_frame(&self, calls: &[Call]) -> Option<usize> {
        calls
            .iter()
            .position(|call| self.lock_frames.iter().any(|rule| rule.matches(call)))
    }
}
