//! Transcript and answer-key lookup for post-hoc grading.
//!
//! The returned data is for the agent's internal grading only and must never
//! be spliced into the candidate-visible transcript. That contract is
//! enforced by convention at the call site; nothing in this module ever
//! formats the answer key into a candidate-facing string.

use serde::Serialize;

use crate::error::ExamError;
use crate::exam::{ExamTypeConfig, RecordingEntry};

/// Grading material for one recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerKey {
    pub subsection: String,
    pub recording_number: u32,
    pub transcript: String,
    pub correct_answers: Vec<String>,
}

/// Retrieves grading-only transcript/answer data for a recording.
pub struct TranscriptAnswerKeyProvider;

impl TranscriptAnswerKeyProvider {
    /// Looks up the transcript and answer key for a numbered recording.
    ///
    /// Matching prefers the entry's explicit `recording_number` field and
    /// falls back to the positional index. Free-form speaking positions are
    /// refused: transcript lookup is undefined there.
    pub fn lookup(
        config: &ExamTypeConfig,
        subsection: &str,
        recording_number: u32,
    ) -> Result<AnswerKey, ExamError> {
        let (section_key, sub) = config.subsection(subsection).ok_or_else(|| {
            ExamError::ConfigurationMissing(format!("unknown subsection {subsection}"))
        })?;

        if sub.recordings.is_empty() {
            let detail = if config
                .section(section_key)
                .and_then(|s| s.speaking_script.as_ref())
                .is_some()
            {
                "is a speaking task; transcript lookup is undefined"
            } else {
                "has no recordings configured"
            };
            return Err(ExamError::UnsupportedSubsection {
                subsection: subsection.to_string(),
                detail: detail.to_string(),
            });
        }

        let entry = Self::match_recording(&sub.recordings, recording_number).ok_or(
            ExamError::RecordingNotFound {
                subsection: subsection.to_string(),
                number: recording_number,
            },
        )?;

        Ok(AnswerKey {
            subsection: subsection.to_string(),
            recording_number,
            transcript: entry.transcript.clone(),
            correct_answers: entry.correct_answers.clone(),
        })
    }

    fn match_recording(recordings: &[RecordingEntry], number: u32) -> Option<&RecordingEntry> {
        if let Some(entry) = recordings
            .iter()
            .find(|r| r.recording_number == Some(number))
        {
            return Some(entry);
        }
        // Positional fallback for lists authored without explicit numbers.
        if number == 0 {
            return None;
        }
        recordings.get(number as usize - 1)
    }
}
