//! findlock-core: possible-deadlock detection for Go goroutine dumps.
//!
//! Parses the text the Go runtime prints for every goroutine (on `SIGQUIT`,
//! a fatal panic, or `debug.Stack`-style dumps) and reports goroutines that
//! wait on the same lock.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use findlock_core::prelude::*;
//!
//! let trace = parse_str(&dump)?;
//! let report = detect(&trace);
//!
//! for group in &report.groups {
//!     println!("{} waiters on {}", group.total_waiters, group.token);
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`trace`]: `Trace` / `Entry` / `Call` data model
//! - [`parse`]: line-oriented dump parser
//! - [`recognize`]: wait-state and lock-acquire frame rules
//! - [`detect`]: grouping by lock token and call-stack dedup
//! - [`report`]: plain text and JSON rendering
//! - [`builder`]: fluent API tying the pieces together
//! - [`config`]: `findlock.toml` loading
//! - [`error`]: typed error handling

pub mod builder;
pub mod config;
pub mod detect;
pub mod error;
pub mod logging;
pub mod parse;
pub mod prelude;
pub mod recognize;
pub mod report;
pub mod trace;

// Error types
pub use error::{
    DetectionFailure, DetectionLogicError, FindlockError, FindlockResult, IoResultExt,
    PartialParse,
};

// Builder API
pub use builder::{Analysis, Findlock};

// Configuration
pub use config::{
    load_config, load_config_file, FindlockConfig, LockFrameConfig, OutputConfig,
    CONFIG_FILE_NAME,
};

// Data model
pub use trace::{Call, Entry, Trace};

// Parsing
pub use parse::{parse_str, parse_trace, TraceParser};

// Recognition
pub use recognize::{LockFrameRule, RecognitionTable};

// Detection
pub use detect::{detect, CallSite, Detector, LockGroup, Report, UniquePattern};

// Reporting
pub use report::{
    print_json, print_plain, render_json, render_plain, render_state_summary,
};

// Logging
pub use logging::{init_structured_logging, log_error, log_info, log_warn};
