//! Exam-type configuration.
//!
//! An [`ExamTypeConfig`] is the immutable description of one assessment
//! template: its sections, subsections, recordings (with grading transcripts
//! and answer keys), section-level speaking scripts, playback policy table,
//! and default position. It is resolved once per session and never mutated.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::playback::{PlaybackPolicy, RecordingClass};

/// The supported spoken-assessment templates.
///
/// EPLIS is the controller-facing exam; SDEA is the pilot-facing one. The two
/// differ in section layout, playback rules, and routing key format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Eplis,
    Sdea,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::Eplis => "eplis",
            ExamType::Sdea => "sdea",
        }
    }

    /// Parses the lowercase wire form used by the API and tool calls.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "eplis" => Some(ExamType::Eplis),
            "sdea" => Some(ExamType::Sdea),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single task type a subsection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Listen to a recording and answer questions about it.
    Listening,
    /// Listen to a short alphanumeric code and read it back.
    CodeReadback,
    /// Describe and discuss a picture. No audio is configured here.
    ImageDiscussion,
    /// Scripted role play driven from section-level prompts.
    RolePlay,
}

/// One numbered audio asset with its grading-only transcript and answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingEntry {
    /// Storage-relative file name of the audio asset.
    pub file: String,
    /// Explicit recording number, when authored. Lookup falls back to the
    /// positional index when this is absent.
    pub recording_number: Option<u32>,
    /// Verbatim transcript. Grading use only; must never reach the
    /// candidate-visible transcript.
    pub transcript: String,
    /// Structured expected answers for the agent's internal grading.
    pub correct_answers: Vec<String>,
}

/// Section-level script for role-play/speaking tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingScript {
    /// Scenario name shown to the examiner persona, not the candidate.
    pub scenario: String,
    /// Ordered spoken prompts the examiner delivers.
    pub prompts: Vec<String>,
}

/// Configuration for one subsection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsectionConfig {
    pub task: TaskKind,
    /// Candidate-facing instructions read at entry.
    pub instructions: Vec<String>,
    /// Numbered recordings, empty for visual/speaking tasks.
    pub recordings: Vec<RecordingEntry>,
    /// Subsection-specific relevance keywords for the topic guard.
    pub keywords: Vec<String>,
}

/// Configuration for one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    pub title: String,
    /// Subsections keyed by id ("2A", "2II", ...). The map is ordered so the
    /// state machine's "next subsection in sorted order" is just key order.
    pub subsections: BTreeMap<String, SubsectionConfig>,
    /// Present when the section is a scripted speaking task.
    pub speaking_script: Option<SpeakingScript>,
}

/// The full immutable template for one exam type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamTypeConfig {
    pub exam_type: ExamType,
    pub duration_minutes: u32,
    /// Sections keyed by 1-based section number.
    pub sections: BTreeMap<u32, SectionConfig>,
    pub default_section: u32,
    pub default_subsection: Option<String>,
    /// Playback rules per recording class. Missing entries resolve to the
    /// strictest policy.
    pub playback: BTreeMap<RecordingClass, PlaybackPolicy>,
}

impl ExamTypeConfig {
    pub fn total_sections(&self) -> u32 {
        self.sections.len() as u32
    }

    pub fn section(&self, number: u32) -> Option<&SectionConfig> {
        self.sections.get(&number)
    }

    /// Reads the section number out of a subsection id's leading digit.
    pub fn section_of_subsection(subsection: &str) -> Option<u32> {
        subsection
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
    }

    /// Locates a subsection by id, returning its section number too.
    pub fn subsection(&self, id: &str) -> Option<(u32, &SubsectionConfig)> {
        let section_no = Self::section_of_subsection(id)?;
        let section = self.sections.get(&section_no)?;
        section.subsections.get(id).map(|sub| (section_no, sub))
    }

    /// First subsection key of a section, in sorted order.
    pub fn first_subsection_of(&self, section: u32) -> Option<&str> {
        self.sections
            .get(&section)?
            .subsections
            .keys()
            .next()
            .map(String::as_str)
    }

    /// Next subsection key after `current` within the same section.
    pub fn next_subsection_after(&self, section: u32, current: &str) -> Option<&str> {
        let subs = &self.sections.get(&section)?.subsections;
        subs.range::<str, _>((
            std::ops::Bound::Excluded(current),
            std::ops::Bound::Unbounded,
        ))
        .next()
        .map(|(k, _)| k.as_str())
    }

    /// Builds the built-in configuration for an exam type.
    pub fn builtin(exam_type: ExamType) -> Self {
        match exam_type {
            ExamType::Eplis => builtin_eplis(),
            ExamType::Sdea => builtin_sdea(),
        }
    }
}

fn recording(file: &str, number: u32, transcript: &str, answers: &[&str]) -> RecordingEntry {
    RecordingEntry {
        file: file.to_string(),
        recording_number: Some(number),
        transcript: transcript.to_string(),
        correct_answers: answers.iter().map(|s| s.to_string()).collect(),
    }
}

fn subsection(
    task: TaskKind,
    instructions: &[&str],
    recordings: Vec<RecordingEntry>,
    keywords: &[&str],
) -> SubsectionConfig {
    SubsectionConfig {
        task,
        instructions: instructions.iter().map(|s| s.to_string()).collect(),
        recordings,
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
    }
}

/// EPLIS: three sections — listening with code readback, unexpected
/// situations (picture + listening), and a scripted role play. Exam
/// recordings may be paused and replayed exactly once.
fn builtin_eplis() -> ExamTypeConfig {
    let mut sections = BTreeMap::new();

    let mut s1 = BTreeMap::new();
    s1.insert(
        "1P1".to_string(),
        subsection(
            TaskKind::CodeReadback,
            &["Listen to each transmission and read back the code you hear."],
            vec![
                recording(
                    "eplis/s1/readback_01.ogg",
                    1,
                    "Squawk six one four two.",
                    &["6142"],
                ),
                recording(
                    "eplis/s1/readback_02.ogg",
                    2,
                    "Contact ground on one two one decimal niner.",
                    &["121.9", "one two one decimal niner"],
                ),
            ],
            &["squawk", "frequency", "readback"],
        ),
    );
    s1.insert(
        "1P2".to_string(),
        subsection(
            TaskKind::Listening,
            &["Listen to the recording and answer the questions."],
            vec![
                recording(
                    "eplis/s1/listening_01.ogg",
                    1,
                    "Tower, Speedbird four five one, request priority landing, \
                     we have a passenger with a medical emergency.",
                    &["priority landing", "medical emergency"],
                ),
                recording(
                    "eplis/s1/listening_02.ogg",
                    2,
                    "All stations, runway two seven closed due to disabled \
                     aircraft, expect delays.",
                    &["runway closed", "disabled aircraft"],
                ),
            ],
            &["emergency", "runway", "landing", "priority"],
        ),
    );
    sections.insert(
        1,
        SectionConfig {
            title: "Listening and readback".to_string(),
            subsections: s1,
            speaking_script: None,
        },
    );

    let mut s2 = BTreeMap::new();
    s2.insert(
        "2I".to_string(),
        subsection(
            TaskKind::ImageDiscussion,
            &["Describe the situation you see in the picture."],
            vec![],
            &["picture", "ground", "apron", "vehicle", "aircraft"],
        ),
    );
    s2.insert(
        "2II".to_string(),
        subsection(
            TaskKind::Listening,
            &["Listen to the pilot report and explain the problem."],
            vec![
                recording(
                    "eplis/s2/unexpected_01.ogg",
                    1,
                    "Approach, Lufthansa two three four, we have a bird strike \
                     on the left engine, request immediate return.",
                    &["bird strike", "immediate return"],
                ),
                recording(
                    "eplis/s2/unexpected_02.ogg",
                    2,
                    "Tower, be advised, we observe smoke from the cargo hold, \
                     declaring pan pan.",
                    &["smoke", "cargo hold", "pan pan"],
                ),
            ],
            &["bird strike", "smoke", "engine", "pan pan", "return"],
        ),
    );
    sections.insert(
        2,
        SectionConfig {
            title: "Unexpected situations".to_string(),
            subsections: s2,
            speaking_script: None,
        },
    );

    let mut s3 = BTreeMap::new();
    s3.insert(
        "3RP".to_string(),
        subsection(
            TaskKind::RolePlay,
            &["You are the controller. Handle the traffic as instructed."],
            vec![],
            &["clearance", "traffic", "holding", "vector", "descend", "climb"],
        ),
    );
    sections.insert(
        3,
        SectionConfig {
            title: "Role play".to_string(),
            subsections: s3,
            speaking_script: Some(SpeakingScript {
                scenario: "Inbound traffic with deteriorating weather".to_string(),
                prompts: vec![
                    "Tower, Varig three three zero, on final, request wind check."
                        .to_string(),
                    "Tower, Varig three three zero, going around, unable to land."
                        .to_string(),
                ],
            }),
        },
    );

    let mut playback = BTreeMap::new();
    playback.insert(
        RecordingClass::ExamRecording,
        PlaybackPolicy {
            allow_seek: false,
            allow_pause: true,
            max_replays: 1,
        },
    );
    playback.insert(
        RecordingClass::GeneralAudio,
        PlaybackPolicy {
            allow_seek: true,
            allow_pause: true,
            max_replays: 3,
        },
    );

    ExamTypeConfig {
        exam_type: ExamType::Eplis,
        duration_minutes: 30,
        sections,
        default_section: 1,
        default_subsection: Some("1P1".to_string()),
        playback,
    }
}

/// SDEA: three sections — interview-style listening, picture description,
/// and a pilot-side role play. Exam recordings allow no seek, no pause, and
/// no replay at all.
fn builtin_sdea() -> ExamTypeConfig {
    let mut sections = BTreeMap::new();

    let mut s1 = BTreeMap::new();
    s1.insert(
        "1A".to_string(),
        subsection(
            TaskKind::Listening,
            &["Listen to the ATIS broadcast and report the conditions."],
            vec![
                recording(
                    "sdea/s1/atis_01.ogg",
                    1,
                    "Information Bravo, wind two four zero at one five knots, \
                     visibility six kilometres, runway one eight in use.",
                    &["wind 240 at 15", "visibility 6 km", "runway 18"],
                ),
                recording(
                    "sdea/s1/atis_02.ogg",
                    2,
                    "Information Charlie, thunderstorms in the vicinity, \
                     expect holding, braking action reported medium.",
                    &["thunderstorms", "holding", "braking action medium"],
                ),
            ],
            &["wind", "visibility", "runway", "holding", "braking"],
        ),
    );
    s1.insert(
        "1B".to_string(),
        subsection(
            TaskKind::CodeReadback,
            &["Read back each clearance code exactly as transmitted."],
            vec![recording(
                "sdea/s1/code_01.ogg",
                1,
                "Cleared to enter controlled airspace, squawk four five seven one.",
                &["4571"],
            )],
            &["squawk", "clearance"],
        ),
    );
    sections.insert(
        1,
        SectionConfig {
            title: "Listening comprehension".to_string(),
            subsections: s1,
            speaking_script: None,
        },
    );

    let mut s2 = BTreeMap::new();
    s2.insert(
        "2A".to_string(),
        subsection(
            TaskKind::ImageDiscussion,
            &["Describe the picture and say what the crew should do."],
            vec![],
            &["picture", "cockpit", "weather", "crew", "instrument"],
        ),
    );
    sections.insert(
        2,
        SectionConfig {
            title: "Picture description".to_string(),
            subsections: s2,
            speaking_script: None,
        },
    );

    let mut s3 = BTreeMap::new();
    s3.insert(
        "3A".to_string(),
        subsection(
            TaskKind::RolePlay,
            &["You are the pilot. Respond to the controller's calls."],
            vec![],
            &["mayday", "divert", "fuel", "request", "altitude"],
        ),
    );
    sections.insert(
        3,
        SectionConfig {
            title: "Role play".to_string(),
            subsections: s3,
            speaking_script: Some(SpeakingScript {
                scenario: "Diversion with minimum fuel".to_string(),
                prompts: vec![
                    "November one two three, say fuel remaining and persons on board."
                        .to_string(),
                ],
            }),
        },
    );

    let mut playback = BTreeMap::new();
    playback.insert(RecordingClass::ExamRecording, PlaybackPolicy::STRICTEST);
    playback.insert(
        RecordingClass::GeneralAudio,
        PlaybackPolicy {
            allow_seek: false,
            allow_pause: true,
            max_replays: 0,
        },
    );

    ExamTypeConfig {
        exam_type: ExamType::Sdea,
        duration_minutes: 25,
        sections,
        default_section: 1,
        default_subsection: Some("1A".to_string()),
        playback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_type_parse_roundtrip() {
        assert_eq!(ExamType::parse("eplis"), Some(ExamType::Eplis));
        assert_eq!(ExamType::parse("SDEA"), Some(ExamType::Sdea));
        assert_eq!(ExamType::parse("toefl"), None);
    }

    #[test]
    fn builtin_subsection_keys_start_with_their_section_digit() {
        for exam_type in [ExamType::Eplis, ExamType::Sdea] {
            let config = ExamTypeConfig::builtin(exam_type);
            for (number, section) in &config.sections {
                for id in section.subsections.keys() {
                    assert_eq!(
                        ExamTypeConfig::section_of_subsection(id),
                        Some(*number),
                        "{exam_type}: subsection {id} not under section {number}"
                    );
                }
            }
        }
    }

    #[test]
    fn builtin_defaults_resolve() {
        for exam_type in [ExamType::Eplis, ExamType::Sdea] {
            let config = ExamTypeConfig::builtin(exam_type);
            assert!(config.section(config.default_section).is_some());
            let default = config.default_subsection.as_deref().unwrap();
            assert!(config.subsection(default).is_some());
        }
    }

    #[test]
    fn next_subsection_uses_sorted_key_order() {
        let config = ExamTypeConfig::builtin(ExamType::Eplis);
        assert_eq!(config.first_subsection_of(1), Some("1P1"));
        assert_eq!(config.next_subsection_after(1, "1P1"), Some("1P2"));
        assert_eq!(config.next_subsection_after(1, "1P2"), None);
        assert_eq!(config.next_subsection_after(2, "2I"), Some("2II"));
    }

    #[test]
    fn subsection_lookup_finds_section_via_leading_digit() {
        let config = ExamTypeConfig::builtin(ExamType::Eplis);
        let (section, sub) = config.subsection("2II").unwrap();
        assert_eq!(section, 2);
        assert_eq!(sub.task, TaskKind::Listening);
        assert_eq!(sub.recordings.len(), 2);
        assert!(config.subsection("9Z").is_none());
    }
}
