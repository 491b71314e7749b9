//! Error type shared by the export pipeline.
use std::fmt;

/// Error type returned by the capture, folding and export stages.
#[derive(Debug, Clone)]
pub enum ExportError {
    /// A fixed-size export mode cannot hold the folded song.
    ///
    /// - `mode` is the export mode name (for example `"BASIC"`).
    /// - `what` identifies the table or sequence that overflowed.
    /// - `limit` is the maximum the mode supports.
    /// - `actual` is the size that was produced.
    CapacityExceeded {
        mode: &'static str,
        what: String,
        limit: usize,
        actual: usize,
    },

    /// An interval's duration rounded down to zero frames while strict
    /// duration checking was enabled.
    ///
    /// The contained value is the index of the offending write.
    ZeroDurationInterval(i64),

    /// Macro emission needed a deeper call stack than the configured bound.
    StackDepthExceeded { limit: usize, needed: usize },

    /// A configuration key or value was not recognized.
    ///
    /// - `key` is the option name as given.
    /// - `value` is the rejected value, if the key itself was known.
    Config { key: String, value: Option<String> },

    /// The driven engine failed during playback; the current subsong is
    /// abandoned.
    Playback(String),

    /// A generic error with a human-readable message.
    Other(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::CapacityExceeded {
                mode,
                what,
                limit,
                actual,
            } => {
                write!(
                    f,
                    "{} export cannot fit {}: {} entries exceeds the limit of {}",
                    mode, what, actual, limit
                )
            }
            ExportError::ZeroDurationInterval(write_index) => {
                write!(
                    f,
                    "interval duration rounded to zero frames at write {}",
                    write_index
                )
            }
            ExportError::StackDepthExceeded { limit, needed } => {
                write!(
                    f,
                    "macro emission needs stack depth {} but only {} is configured",
                    needed, limit
                )
            }
            ExportError::Config { key, value } => match value {
                Some(v) => write!(f, "invalid value for option {}: {}", key, v),
                None => write!(f, "unknown option: {}", key),
            },
            ExportError::Playback(msg) => write!(f, "playback failed: {}", msg),
            ExportError::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for ExportError {}
