//! Audio routing resolution.
//!
//! Maps (exam type, subsection, recording number) to a playback source
//! descriptor. Each exam type contributes a [`RoutingStrategy`] for its wire
//! format, so adding an exam type means adding a strategy, not editing every
//! function.
//!
//! Resolution fails closed: a subsection with neither a recording list nor a
//! section-level speaking script is refused outright. An earlier revision of
//! this resolver substituted a randomly chosen general audio file here, which
//! broke transcript correlation; that fallback must not come back.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExamError;
use crate::exam::{ExamType, ExamTypeConfig};

/// Where the requested audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceType {
    /// A numbered recording from the subsection's configured list.
    SubsectionAudio,
    /// A scripted examiner prompt from section-level role-play config.
    SpeakingPrompt,
}

/// A resolved playback source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AudioDescriptor {
    pub source_type: AudioSourceType,
    pub section_key: u32,
    /// Lower-cased, exam-type-specific composite of section and subsection,
    /// used as the storage/API routing key.
    pub api_section: String,
    /// 1-based recording (or prompt) number.
    pub recording_number: u32,
}

/// Per-exam-type wire-format rules for routing keys.
pub trait RoutingStrategy: Send + Sync {
    fn api_section(&self, section: u32, subsection: &str) -> String;
}

struct EplisRouting;

impl RoutingStrategy for EplisRouting {
    fn api_section(&self, section: u32, subsection: &str) -> String {
        format!("eplis-s{}-{}", section, subsection.to_lowercase())
    }
}

struct SdeaRouting;

impl RoutingStrategy for SdeaRouting {
    fn api_section(&self, section: u32, subsection: &str) -> String {
        format!("sdea_part{}_{}", section, subsection.to_lowercase())
    }
}

/// Returns the routing strategy for an exam type.
pub fn strategy_for(exam_type: ExamType) -> &'static dyn RoutingStrategy {
    match exam_type {
        ExamType::Eplis => &EplisRouting,
        ExamType::Sdea => &SdeaRouting,
    }
}

/// Resolves playback requests against an exam-type configuration.
pub struct AudioRoutingResolver;

impl AudioRoutingResolver {
    /// Resolves a playback request.
    ///
    /// `subsection` defaults to the exam type's configured default position;
    /// `recording_number` defaults to 1. Recording numbers are validated
    /// against the configured list length — out-of-range requests fail
    /// closed, never substituted.
    pub fn resolve(
        config: &ExamTypeConfig,
        subsection: Option<&str>,
        recording_number: Option<u32>,
    ) -> Result<AudioDescriptor, ExamError> {
        let subsection_id = match subsection {
            Some(id) => id,
            None => config.default_subsection.as_deref().ok_or_else(|| {
                ExamError::ConfigurationMissing(format!(
                    "exam type {} has no default subsection",
                    config.exam_type
                ))
            })?,
        };

        let (section_key, sub) = config.subsection(subsection_id).ok_or_else(|| {
            ExamError::ConfigurationMissing(format!("unknown subsection {subsection_id}"))
        })?;
        let number = recording_number.unwrap_or(1);

        if !sub.recordings.is_empty() {
            if number == 0 || number as usize > sub.recordings.len() {
                return Err(ExamError::RecordingNotFound {
                    subsection: subsection_id.to_string(),
                    number,
                });
            }
            let strategy = strategy_for(config.exam_type);
            return Ok(AudioDescriptor {
                source_type: AudioSourceType::SubsectionAudio,
                section_key,
                api_section: strategy.api_section(section_key, subsection_id),
                recording_number: number,
            });
        }

        // No subsection list: a scripted speaking task plays section-level
        // examiner prompts instead.
        if let Some(script) = config
            .section(section_key)
            .and_then(|s| s.speaking_script.as_ref())
        {
            if number == 0 || number as usize > script.prompts.len() {
                return Err(ExamError::RecordingNotFound {
                    subsection: subsection_id.to_string(),
                    number,
                });
            }
            let strategy = strategy_for(config.exam_type);
            return Ok(AudioDescriptor {
                source_type: AudioSourceType::SpeakingPrompt,
                section_key,
                api_section: strategy.api_section(section_key, subsection_id),
                recording_number: number,
            });
        }

        // Pure visual/discussion task. Refuse; never substitute a file.
        Err(ExamError::no_playable_audio(subsection_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eplis() -> ExamTypeConfig {
        ExamTypeConfig::builtin(ExamType::Eplis)
    }

    #[test]
    fn resolves_every_configured_recording_and_fails_past_the_end() {
        let config = eplis();
        let (_, sub) = config.subsection("2II").unwrap();
        let n = sub.recordings.len() as u32;
        for number in 1..=n {
            let descriptor =
                AudioRoutingResolver::resolve(&config, Some("2II"), Some(number)).unwrap();
            assert_eq!(descriptor.source_type, AudioSourceType::SubsectionAudio);
            assert_eq!(descriptor.recording_number, number);
        }
        let err = AudioRoutingResolver::resolve(&config, Some("2II"), Some(n + 1)).unwrap_err();
        assert_eq!(
            err,
            ExamError::RecordingNotFound {
                subsection: "2II".to_string(),
                number: n + 1,
            }
        );
    }

    #[test]
    fn api_section_is_exam_type_specific_and_lowercase() {
        let descriptor = AudioRoutingResolver::resolve(&eplis(), Some("2II"), None).unwrap();
        assert_eq!(descriptor.api_section, "eplis-s2-2ii");
        assert_eq!(descriptor.section_key, 2);

        let sdea = ExamTypeConfig::builtin(ExamType::Sdea);
        let descriptor = AudioRoutingResolver::resolve(&sdea, Some("1A"), None).unwrap();
        assert_eq!(descriptor.api_section, "sdea_part1_1a");
    }

    #[test]
    fn role_play_resolves_to_speaking_prompt() {
        let descriptor = AudioRoutingResolver::resolve(&eplis(), Some("3RP"), None).unwrap();
        assert_eq!(descriptor.source_type, AudioSourceType::SpeakingPrompt);
        assert_eq!(descriptor.section_key, 3);
    }

    #[test]
    fn visual_only_subsection_always_fails_closed() {
        // "2I" has no recordings and section 2 has no speaking script.
        for number in [None, Some(1), Some(2)] {
            let err = AudioRoutingResolver::resolve(&eplis(), Some("2I"), number).unwrap_err();
            assert_eq!(err, ExamError::no_playable_audio("2I"));
        }
    }

    #[test]
    fn missing_subsection_falls_back_to_exam_default() {
        let descriptor = AudioRoutingResolver::resolve(&eplis(), None, None).unwrap();
        assert_eq!(descriptor.api_section, "eplis-s1-1p1");
        assert_eq!(descriptor.recording_number, 1);
    }

    #[test]
    fn unknown_subsection_is_a_configuration_error() {
        let err = AudioRoutingResolver::resolve(&eplis(), Some("7X"), None).unwrap_err();
        assert!(matches!(err, ExamError::ConfigurationMissing(_)));
    }

    #[test]
    fn recording_number_zero_is_rejected() {
        let err = AudioRoutingResolver::resolve(&eplis(), Some("2II"), Some(0)).unwrap_err();
        assert!(matches!(err, ExamError::RecordingNotFound { .. }));
    }
}
