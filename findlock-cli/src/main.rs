//! findlock CLI - find possible deadlocks in Go goroutine dumps.
//!
//! Reads a dump (the text a Go program prints on SIGQUIT or a fatal error)
//! from a file or stdin and reports goroutines waiting on the same lock.
//!
//! Exit codes:
//! - `0`: no possible deadlock
//! - `1`: possible deadlock(s) reported
//! - `2`: I/O, parse or config error

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use findlock_core::{
    init_structured_logging, load_config, load_config_file, log_error, log_info, log_warn,
    print_json, print_plain, render_state_summary, Findlock, FindlockConfig, FindlockError,
    IoResultExt, PartialParse,
};

/// Label for errors while reading standard input.
const STDIN_LABEL: &str = "<stdin>";

#[derive(Parser, Debug)]
#[command(author, version, about = "Find possible deadlocks in Go goroutine dumps")]
pub struct Cli {
    /// Goroutine dump to read (defaults to stdin)
    input: Option<PathBuf>,

    /// Run the deadlock detector
    #[arg(short = 'l', long = "lock-detector", action = ArgAction::Set, default_value_t = true)]
    lock_detector: bool,

    /// Output the report in JSON format
    #[arg(long)]
    json: bool,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,

    /// Print how many goroutines are in each state
    #[arg(long)]
    states: bool,

    /// Treat wait entries that cannot be attributed to a lock as errors
    #[arg(long)]
    strict: bool,

    /// Config file (defaults to ./findlock.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Clean,
    PossibleDeadlock,
}

/// Loads the explicit config, or `findlock.toml` from the working directory.
fn resolve_config(explicit: Option<&Path>) -> Result<(FindlockConfig, PathBuf)> {
    if let Some(path) = explicit {
        return Ok((load_config_file(path)?, path.to_path_buf()));
    }

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let cfg = load_config(&cwd)?.unwrap_or_default();
    Ok((cfg, cwd.join(findlock_core::CONFIG_FILE_NAME)))
}

/// Reads the whole dump before any analysis starts.
///
/// Invalid UTF-8 is replaced rather than rejected; the parser only needs the
/// ASCII structure of the dump.
fn read_input(path: Option<&Path>) -> Result<String> {
    let mut bytes = Vec::new();
    match path {
        Some(p) => {
            std::fs::File::open(p)
                .and_then(|mut f| f.read_to_end(&mut bytes))
                .with_path(p)?;
        }
        None => {
            std::io::stdin()
                .read_to_end(&mut bytes)
                .with_path(STDIN_LABEL)?;
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Whether plain output should carry ANSI colors.
fn use_color(cli_no_color: bool, cfg: &FindlockConfig, no_color_env: bool) -> bool {
    let configured = cfg.output.as_ref().and_then(|o| o.color).unwrap_or(true);
    !cli_no_color && !no_color_env && configured
}

fn run(cli: &Cli) -> Result<Outcome> {
    if !cli.lock_detector {
        println!("Deadlock detector disabled, doesn't make sense ...");
        if cli.states {
            let input = read_input(cli.input.as_deref())?;
            let analysis = Findlock::new().detector(false).analyze_str(&input)?;
            print!("{}", render_state_summary(&analysis.trace));
        }
        return Ok(Outcome::Clean);
    }

    let (cfg, origin) = resolve_config(cli.config.as_deref())?;
    let finder = Findlock::new().with_config(&cfg, &origin)?;
    let input = read_input(cli.input.as_deref())?;
    log_info(&format!("read {} bytes of goroutine dump", input.len()));

    let analysis = finder.analyze_str(&input)?;
    let Some(report) = analysis.report else {
        return Ok(Outcome::Clean);
    };

    if cli.states {
        print!("{}", render_state_summary(&analysis.trace));
    }

    let json = cli.json || cfg.output.as_ref().is_some_and(|o| o.wants_json());
    if json {
        print_json(&report).context("Failed to serialize report")?;
    } else {
        let color = use_color(cli.no_color, &cfg, std::env::var_os("NO_COLOR").is_some());
        print_plain(&report, color);
    }

    for issue in &report.issues {
        log_warn(&issue.to_string());
    }
    if cli.strict {
        if let Some(issue) = report.issues.first() {
            return Err(FindlockError::from(issue.clone()))
                .context("Wait entry could not be attributed to a lock (--strict)");
        }
    }

    if report.possible_deadlocks() > 0 {
        Ok(Outcome::PossibleDeadlock)
    } else {
        Ok(Outcome::Clean)
    }
}

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] findlock internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 2.");
    }));

    init_structured_logging();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(Outcome::Clean) => ExitCode::SUCCESS,
        Ok(Outcome::PossibleDeadlock) => ExitCode::from(1),
        Err(err) => {
            log_error(&format!("{:#}", err));
            eprintln!("error: {:#}", err);
            if let Some(partial) = err.downcast_ref::<PartialParse>() {
                eprintln!(
                    "note: {} goroutine(s) were parsed before the error",
                    partial.partial.len()
                );
            }
            ExitCode::from(2)
        }
    }
}
