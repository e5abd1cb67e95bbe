//! Goroutine dump parser.
//!
//! Line-oriented state machine with two states:
//!
//! - **Seeking**: outside any goroutine block; everything except a
//!   `goroutine ... [state]:` header is ignored.
//! - **InEntry**: inside a block. Non-indented lines are call signatures,
//!   indented lines are `file:line +offset` locations for the most recent
//!   frame, `created by` ends the frame list and a blank line ends the block.
//!
//! The parser owns the entry being built (an entry cursor) instead of
//! tracking positions into the trace, so a stray line can never land in the
//! wrong entry. Errors stop the parse but keep everything read so far, see
//! [`PartialParse`].

use std::borrow::Cow;
use std::io::BufRead;
use std::time::Duration;

use tracing::debug;

use crate::error::{FindlockError, FindlockResult, PartialParse};
use crate::trace::{Call, Entry, Trace};

/// Marker opening a goroutine block at column 0.
pub const GOROUTINE_MARKER: &str = "goroutine";

/// Marker of the synthetic frame naming the spawning function.
pub const CREATED_BY_MARKER: &str = "created by";

/// Printed by the runtime instead of frames for a goroutine it could not
/// stop, indented like a location line.
pub const STACK_UNAVAILABLE: &str = "goroutine running on other thread; stack unavailable";

/// Label used for I/O errors while reading the dump stream.
const INPUT_LABEL: &str = "<input>";

/// Parses a whole dump from a buffered reader.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD.
pub fn parse_trace<R: BufRead>(mut reader: R) -> Result<Trace, PartialParse> {
    let mut parser = TraceParser::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Cow::Owned(_) = line {
                    debug!(line = parser.line_no + 1, "replaced invalid UTF-8");
                }
                if let Err(e) = parser.feed_line(&line) {
                    return Err(parser.into_partial(e));
                }
            }
            Err(e) => return Err(parser.into_partial(FindlockError::io(INPUT_LABEL, e))),
        }
    }

    parser.finish()
}

/// Parses a dump already held in memory.
pub fn parse_str(input: &str) -> Result<Trace, PartialParse> {
    parse_trace(input.as_bytes())
}

enum State {
    Seeking,
    InEntry(EntryCursor),
}

/// The goroutine block currently being built.
struct EntryCursor {
    entry: Entry,
    /// Dump line of the last call, while it still waits for its location
    pending_call: Option<usize>,
    /// Set by `created by`; later frames belong to no call list
    frames_closed: bool,
}

impl EntryCursor {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            pending_call: None,
            frames_closed: false,
        }
    }

    /// Fails if the previous call never got its location line.
    fn ensure_located(&self) -> FindlockResult<()> {
        match (self.pending_call, self.entry.calls.last()) {
            (Some(line), Some(call)) => Err(FindlockError::parse(
                line,
                format!("call `{}` has no location line", call.name),
            )),
            _ => Ok(()),
        }
    }

    fn push_call(&mut self, line: &str, line_no: usize) -> FindlockResult<()> {
        let Some((name, args)) = split_signature(line) else {
            debug!(line = line_no, "skipping line without a call signature");
            return Ok(());
        };
        self.ensure_located()?;
        self.entry.calls.push(Call::new(name, args));
        self.pending_call = Some(line_no);
        Ok(())
    }

    fn close_frames(&mut self, line: &str) -> FindlockResult<()> {
        self.ensure_located()?;
        self.frames_closed = true;
        self.entry.created_by = Some(Call::new(created_by_name(line), Vec::new()));
        Ok(())
    }

    fn attach_location(&mut self, line: &str, line_no: usize) -> FindlockResult<()> {
        if self.frames_closed {
            let Some(created_by) = self.entry.created_by.as_mut().filter(|c| !c.has_location())
            else {
                return Ok(());
            };
            let (filename, number) = parse_location(line, line_no)?;
            created_by.filename = filename.to_string();
            created_by.line = number;
            return Ok(());
        }

        if self.entry.calls.is_empty() {
            return Err(FindlockError::parse(
                line_no,
                format!("location line has no preceding call in {}", self.entry.label()),
            ));
        }

        let (filename, number) = parse_location(line, line_no)?;
        if let Some(call) = self.entry.calls.last_mut() {
            call.filename = filename.to_string();
            call.line = number;
        }
        self.pending_call = None;
        Ok(())
    }
}

/// Incremental dump parser, fed one line at a time.
pub struct TraceParser {
    trace: Trace,
    state: State,
    line_no: usize,
}

impl Default for TraceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceParser {
    pub fn new() -> Self {
        Self {
            trace: Trace::default(),
            state: State::Seeking,
            line_no: 0,
        }
    }

    /// Feeds the next dump line, with or without its terminator.
    pub fn feed_line(&mut self, raw: &str) -> FindlockResult<()> {
        self.line_no += 1;
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.starts_with(GOROUTINE_MARKER) {
            self.close_entry()?;
            let entry = parse_header(line, self.line_no)?;
            self.state = State::InEntry(EntryCursor::new(entry));
            return Ok(());
        }

        if line.trim().is_empty() {
            return self.close_entry();
        }

        let line_no = self.line_no;
        let State::InEntry(cursor) = &mut self.state else {
            return Ok(());
        };

        if line.starts_with([' ', '\t']) {
            if line.trim() == STACK_UNAVAILABLE {
                debug!(line = line_no, entry = %cursor.entry.label(), "stack unavailable");
                return Ok(());
            }
            cursor.attach_location(line, line_no)
        } else if line.contains(CREATED_BY_MARKER) {
            cursor.close_frames(line)
        } else if cursor.frames_closed {
            Ok(())
        } else {
            cursor.push_call(line, line_no)
        }
    }

    /// Closes the last block and returns the trace.
    pub fn finish(mut self) -> Result<Trace, PartialParse> {
        match self.close_entry() {
            Ok(()) => {
                debug!(entries = self.trace.len(), lines = self.line_no, "dump parsed");
                Ok(self.trace)
            }
            Err(e) => Err(self.into_partial(e)),
        }
    }

    /// Stops parsing, keeping the open block in the partial trace.
    pub fn into_partial(mut self, error: FindlockError) -> PartialParse {
        if let State::InEntry(cursor) = std::mem::replace(&mut self.state, State::Seeking) {
            self.trace.entries.push(cursor.entry);
        }
        debug!(entries = self.trace.len(), %error, "dump parse stopped");
        PartialParse {
            partial: self.trace,
            error,
        }
    }

    fn close_entry(&mut self) -> FindlockResult<()> {
        if let State::InEntry(cursor) = std::mem::replace(&mut self.state, State::Seeking) {
            let located = cursor.ensure_located();
            self.trace.entries.push(cursor.entry);
            located?;
        }
        Ok(())
    }
}

/// Parses `goroutine 7 [semacquire, 5 minutes]:`.
fn parse_header(line: &str, line_no: usize) -> FindlockResult<Entry> {
    let open = line.find('[').ok_or_else(|| {
        FindlockError::parse(
            line_no,
            "missing '[' that marks the beginning of goroutine info",
        )
    })?;
    let close = line[open..].find(']').map(|i| open + i).ok_or_else(|| {
        FindlockError::parse(line_no, "missing ']' that marks the end of goroutine info")
    })?;

    let id = line[GOROUTINE_MARKER.len()..open]
        .split_whitespace()
        .next()
        .and_then(|t| t.parse::<u64>().ok());

    let mut fields = split_args(&line[open + 1..close]).into_iter();
    let state = fields.next().unwrap_or_default();
    let minutes = fields.next().map(|f| leading_number(&f)).unwrap_or(0);

    Ok(Entry {
        id,
        state,
        running: Duration::from_secs(minutes.saturating_mul(60)),
        calls: Vec::new(),
        created_by: None,
        header_line: line_no,
    })
}

/// Splits `pkg.fn(a, b)` into name and argument tokens.
///
/// The name ends at the last `(` before the last `)`, which keeps receiver
/// types like `(*RWMutex)` inside the name.
fn split_signature(line: &str) -> Option<(&str, Vec<String>)> {
    let close = line.rfind(')')?;
    let open = line[..close].rfind('(')?;
    Some((&line[..open], split_args(&line[open + 1..close])))
}

/// Comma-separated tokens, trimmed of spaces. Empty input gives no tokens.
fn split_args(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    s.split(',').map(|a| a.trim_matches(' ').to_string()).collect()
}

/// Parses `\t/path/file.go:42 +0x1b` into `("/path/file.go", 42)`.
fn parse_location(line: &str, line_no: usize) -> FindlockResult<(&str, u32)> {
    let text = line.trim_start_matches([' ', '\t']);
    let (filename, rest) = text
        .split_once(':')
        .ok_or_else(|| FindlockError::parse(line_no, "didn't find the ':' separator"))?;

    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let field = &rest[..end];
    let number = field.parse::<u32>().map_err(|_| {
        FindlockError::parse(line_no, format!("invalid line number `{}`", field))
    })?;

    Ok((filename, number))
}

/// `created by main.main in goroutine 1` gives `main.main`.
fn created_by_name(line: &str) -> String {
    let after = line
        .find(CREATED_BY_MARKER)
        .map(|i| &line[i + CREATED_BY_MARKER.len()..])
        .unwrap_or("");
    after
        .split(" in goroutine ")
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Leading decimal digits of `s`, 0 if there are none.
fn leading_number(s: &str) -> u64 {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}
