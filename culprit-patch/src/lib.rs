pub mod hunk;
pub mod risk;

pub use hunk::{ChangedLines, HunkHeader, changed_line_numbers, changed_lines};
pub use risk::{DEFAULT_THRESHOLD, RiskHit, RiskScore, RiskSignal, score_defect_risk, score_patch};

/// Error type for patch parsing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// A `@@ ... @@` line whose ranges are missing or non-numeric.
    #[error("Malformed hunk header at patch line {line}: {header}")]
    MalformedHunk {
        /// 1-based line of the header within the patch text.
        line: usize,
        /// The offending header, verbatim.
        header: String,
    },
}

pub type Result<T> = std::result::Result<T, PatchError>;
