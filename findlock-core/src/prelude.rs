//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use findlock_core::prelude::*;
//! ```

// Data model and parsing
pub use crate::parse::{parse_str, parse_trace};
pub use crate::trace::{Call, Entry, Trace};

// Detection
pub use crate::detect::{detect, Detector, Report};
pub use crate::recognize::RecognitionTable;

// Errors
pub use crate::error::{FindlockError, FindlockResult, PartialParse};

// Builder API
pub use crate::builder::{Analysis, Findlock};
