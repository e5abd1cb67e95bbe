//! Output formatting - plaintext and JSON.

use std::fmt::Write as _;

use crate::detect::Report;
use crate::trace::Trace;

const RED_BACKGROUND: &str = "\x1b[41m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Width of the function column in numbered stacks.
const NAME_WIDTH: usize = 40;

fn paint(color: bool, code: &str, text: &str) -> String {
    if color {
        format!("{}{}{}", code, text, RESET)
    } else {
        text.to_string()
    }
}

/// Renders a report as human-readable text.
pub fn render_plain(report: &Report, color: bool) -> String {
    if report.no_locks_detected() {
        return "No locks detected!\n".to_string();
    }

    // Writing to a String cannot fail, so the fmt results are ignored.
    let mut out = String::new();
    let header = format!("DETECTED {} POSSIBLE DEADLOCK(S)", report.possible_deadlocks());
    let _ = writeln!(out, "{}", paint(color, RED_BACKGROUND, &header));

    for group in &report.groups {
        let _ = writeln!(
            out,
            "- {} call(s) to Lock() for {}, {} unique:",
            group.total_waiters,
            group.token,
            group.unique_patterns.len()
        );

        for pattern in &group.unique_patterns {
            let site = &pattern.acquire_site;
            let location = format!("{}:{}", site.filename, site.line);
            let _ = write!(
                out,
                "  ┌┤ {} @ {}",
                paint(color, GREEN, &site.name),
                paint(color, YELLOW, &location)
            );
            if !pattern.goroutines.is_empty() {
                let ids: Vec<String> = pattern.goroutines.iter().map(u64::to_string).collect();
                let _ = write!(out, "  [goroutine {}]", ids.join(", "));
            }
            out.push('\n');

            let last = pattern.call_stack.len().saturating_sub(1);
            for (j, call) in pattern.call_stack.iter().enumerate() {
                let branch = if j < last { "├" } else { "└" };
                let _ = writeln!(
                    out,
                    "  {} {}: {:<width$} @ {}:{}",
                    branch,
                    j,
                    call.name,
                    call.filename,
                    call.line,
                    width = NAME_WIDTH
                );
            }
        }
    }

    for issue in &report.issues {
        let _ = writeln!(out, "{} {}", paint(color, YELLOW, "WARNING:"), issue);
    }

    out
}

/// Prints a report in plain text format.
pub fn print_plain(report: &Report, color: bool) {
    print!("{}", render_plain(report, color));
}

/// Renders a report as pretty-printed JSON.
pub fn render_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Prints a report in JSON format.
pub fn print_json(report: &Report) -> serde_json::Result<()> {
    println!("{}", render_json(report)?);
    Ok(())
}

/// Renders the per-state goroutine counts of a trace.
pub fn render_state_summary(trace: &Trace) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "STATES ({} goroutines):", trace.len());
    for (state, count) in trace.state_summary() {
        let _ = writeln!(out, "  {:>6}  {}", count, state);
    }
    out
}
