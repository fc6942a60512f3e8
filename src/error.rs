//! Typed error kinds for the pileup core.
//!
//! `main.rs` converts these into a process exit code and a single-line
//! diagnostic; within the library, fallible operations return
//! `Result<T, CoreError>` so callers can `match` on the failure kind
//! rather than inspect an opaque `anyhow::Error`.

use thiserror::Error;

/// Error produced by the pileup core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to open input '{path}': {source}")]
    InputOpenError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("index error for '{path}': {reason}")]
    IndexError { path: String, reason: String },

    #[error("failed to decode read at {chrom}:{pos}: {reason}")]
    DecodeError {
        chrom: String,
        pos: i64,
        reason: String,
    },

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("failed to write temp file '{path}': {source}")]
    TempWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("merge mismatch: {0}")]
    MergeMismatch(String),

    #[error("failed to rename '{from}' to '{to}': {source}")]
    RenameError {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_component_context() {
        let err = CoreError::InvalidConfig("min_maf must be in [0, 0.5]".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: min_maf must be in [0, 0.5]"
        );

        let err = CoreError::MergeMismatch("ns_merged=3 != sum(shard.ns)=4".into());
        assert!(err.to_string().contains("ns_merged"));
    }
}
