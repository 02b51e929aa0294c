//! Typed failure taxonomy for the orchestration core.
//!
//! Every fallible core operation returns one of these variants; a mid-exam
//! panic is never acceptable. Duplicate/throttled control signals are *not*
//! errors — they are reported as [`crate::session::ApplyOutcome::Dropped`]
//! so callers can stay silent without matching on an error type.

/// Errors produced by the resolvers and the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExamError {
    /// A required piece of exam-type configuration is absent.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A recording number outside the configured list was requested.
    /// Out-of-range requests fail closed; a different file is never
    /// substituted.
    #[error("recording {number} not found for subsection {subsection}")]
    RecordingNotFound { subsection: String, number: u32 },

    /// The subsection cannot serve this request (no playable audio, or a
    /// speaking position where transcript lookup is undefined).
    #[error("subsection {subsection} {detail}")]
    UnsupportedSubsection { subsection: String, detail: String },

    /// The action is not valid for the current session state or caller.
    #[error("invalid action: {0}")]
    InvalidAction(String),
}

impl ExamError {
    /// Shorthand for the fail-closed routing refusal.
    pub fn no_playable_audio(subsection: &str) -> Self {
        ExamError::UnsupportedSubsection {
            subsection: subsection.to_string(),
            detail: "does not define playable audio".to_string(),
        }
    }
}
