//! Structured model of a goroutine dump.
//!
//! A [`Trace`] is the ordered list of goroutine blocks ([`Entry`]) found in
//! the dump; each entry holds its frames ([`Call`]) most-recent first,
//! exactly as printed by the Go runtime.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

/// One stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Call {
    /// Fully qualified function name, e.g. `sync.(*RWMutex).Lock`
    pub name: String,
    /// Source file from the location line
    pub filename: String,
    /// Line number (1-indexed), 0 until the location line is seen
    pub line: u32,
    /// Raw argument tokens, trimmed
    pub args: Vec<String>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            ..Self::default()
        }
    }

    /// Whether a location line has been attached to this frame.
    pub fn has_location(&self) -> bool {
        !self.filename.is_empty()
    }

    /// First argument token, the receiver for method frames.
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// One goroutine snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Goroutine number from the header, when numeric
    pub id: Option<u64>,
    /// Reported status, e.g. `running` or `semacquire`
    pub state: String,
    /// How long the goroutine has been in `state`, zero if not reported
    pub running: Duration,
    /// Frames, most recent first
    pub calls: Vec<Call>,
    /// The synthetic `created by` frame, if the dump printed one
    pub created_by: Option<Call>,
    /// Dump line (1-indexed) of the header
    pub header_line: usize,
}

impl Entry {
    /// Human label for diagnostics: `goroutine 7`, or the header line.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("goroutine {}", id),
            None => format!("goroutine at line {}", self.header_line),
        }
    }

    /// Flattened call-stack shape: one `name file:line` row per frame.
    ///
    /// Two entries have the same shape iff these strings are byte-equal.
    pub fn flatten(&self) -> String {
        let mut flat = String::with_capacity(self.calls.len() * 64);
        for call in &self.calls {
            // Writing to a String cannot fail.
            let _ = writeln!(flat, "{} {}:{}", call.name, call.filename, call.line);
        }
        flat
    }
}

/// All goroutines of a dump, in dump order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Trace {
    pub entries: Vec<Entry>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose state contains `needle`, with their trace positions.
    pub fn query<'a: 'n, 'n>(
        &'a self,
        needle: &'n str,
    ) -> impl Iterator<Item = (usize, &'a Entry)> + 'n {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.state.contains(needle))
    }

    /// Distinct states with their entry counts, in first-seen order.
    pub fn state_summary(&self) -> Vec<(String, usize)> {
        let mut order: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for entry in &self.entries {
            match index.get(entry.state.as_str()) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(entry.state.as_str(), order.len());
                    order.push((entry.state.clone(), 1));
                }
            }
        }

        order
    }
}
