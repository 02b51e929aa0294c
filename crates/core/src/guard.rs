//! Topic guard: classifies candidate utterances before any agent call.
//!
//! The guard is a cheap, synchronous filter. It always lets control traffic
//! through (admin-tagged messages, the canonical start phrase, explicit
//! completion intent, short navigation commands), then judges relevance for
//! the current position, and only then looks for off-topic signals. A block
//! short-circuits the turn and returns an in-character redirect naming the
//! current section and subsection.
//!
//! The classifier is decomposed into small named predicates over normalized
//! text so each rule can be unit-tested on its documented examples.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::Serialize;

use crate::exam::{ExamTypeConfig, TaskKind};

/// The canonical phrase that begins the evaluation. Always allowed.
pub const START_TRIGGER: &str = "i am ready to start the evaluation";

/// Leading marker for administrative control messages.
pub const ADMIN_TAG: &str = "[system]";

/// Verdict on a single candidate utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardDecision {
    pub blocked: bool,
    /// In-character redirect for the candidate, present only when blocked.
    pub redirect_message: Option<String>,
    /// Machine-readable classification, for logs.
    pub reason: Option<String>,
}

impl GuardDecision {
    fn allow(reason: &str) -> Self {
        GuardDecision {
            blocked: false,
            redirect_message: None,
            reason: Some(reason.to_string()),
        }
    }

    fn block(message: String, reason: &str) -> Self {
        GuardDecision {
            blocked: true,
            redirect_message: Some(message),
            reason: Some(reason.to_string()),
        }
    }
}

/// Classifies utterances as on-task, off-task, or control traffic.
pub struct TopicGuard;

impl TopicGuard {
    /// Checks an utterance against the current exam position.
    pub fn check(
        config: &ExamTypeConfig,
        section: u32,
        subsection: Option<&str>,
        utterance: &str,
    ) -> GuardDecision {
        if is_admin_tagged(utterance) {
            return GuardDecision::allow("admin_tag");
        }

        let normalized = normalize(utterance);

        if is_start_trigger(&normalized) {
            return GuardDecision::allow("start_trigger");
        }
        if has_completion_intent(&normalized) {
            return GuardDecision::allow("completion_intent");
        }
        if is_navigation_command(&normalized) {
            return GuardDecision::allow("navigation");
        }

        let sub_config = subsection.and_then(|id| config.subsection(id)).map(|(_, s)| s);
        let keywords: &[String] = sub_config.map(|s| s.keywords.as_slice()).unwrap_or(&[]);
        let relevant = match sub_config.map(|s| s.task) {
            Some(TaskKind::CodeReadback) => {
                is_code_readback(&normalized)
                    || mentions_aviation_vocabulary(&normalized)
                    || matches_keywords(&normalized, keywords)
            }
            Some(_) => {
                mentions_aviation_vocabulary(&normalized)
                    || matches_keywords(&normalized, keywords)
            }
            None => mentions_aviation_vocabulary(&normalized),
        };
        if relevant {
            return GuardDecision::allow("relevant");
        }

        let reason = if has_off_domain_intent(&normalized) {
            "off_domain"
        } else if is_small_talk(&normalized) {
            "small_talk"
        } else if is_low_signal(&normalized) {
            "low_signal"
        } else {
            return GuardDecision::allow("unclassified");
        };

        let position = match subsection {
            Some(id) => format!("Section {section}, Subsection {id}"),
            None => format!("Section {section}"),
        };
        let nudge = nudge_for(sub_config.map(|s| s.task));
        let message =
            format!("Let's stay focused on the assessment. You are currently in {position}. {nudge}");
        GuardDecision::block(message, reason)
    }
}

fn nudge_for(task: Option<TaskKind>) -> &'static str {
    match task {
        Some(TaskKind::CodeReadback) => "Please read back the code exactly as you heard it.",
        Some(TaskKind::Listening) => "Please answer based on the recording you just heard.",
        Some(TaskKind::ImageDiscussion) => "Please describe what you can see in the picture.",
        Some(TaskKind::RolePlay) => "Please stay in the scenario and respond as briefed.",
        None => "Please continue with the current task.",
    }
}

/// Lowercases, strips punctuation, and collapses whitespace.
///
/// `"Tell me a JOKE, please!"` → `"tell me a joke please"`.
pub(crate) fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for `"[System] advance the session"`, false for plain text.
pub(crate) fn is_admin_tagged(raw: &str) -> bool {
    raw.trim_start().to_lowercase().starts_with(ADMIN_TAG)
}

/// True for `"I am ready to start the evaluation."`.
pub(crate) fn is_start_trigger(normalized: &str) -> bool {
    normalized.contains(START_TRIGGER)
}

const COMPLETION_PHRASES: &[&str] = &[
    "finish the exam",
    "finish the evaluation",
    "end the exam",
    "end the evaluation",
    "complete the exam",
    "stop the exam",
    "i want to finish",
    "i want to stop",
    "i am done with the exam",
];

/// True for `"I want to finish the exam now"`, false for `"I am finished with
/// this question"` and for phrases buried inside unrelated words
/// (`"recommend the examination"` must not read as `"end the exam"`).
pub(crate) fn has_completion_intent(normalized: &str) -> bool {
    COMPLETION_PHRASES
        .iter()
        .any(|p| contains_word_phrase(normalized, p))
}

/// True when `phrase` occurs as a contiguous run of whole words.
///
/// Raw substring containment is not enough here: `"end the exam"` is a
/// substring of `"recommend the examination"`, and `"sing"` of `"crossing"`.
fn contains_word_phrase(normalized: &str, phrase: &str) -> bool {
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}

const NAVIGATION_COMMANDS: &[&str] = &[
    "next",
    "next section",
    "next part",
    "next one",
    "repeat",
    "repeat that",
    "play it again",
    "again",
    "continue",
    "go on",
];

/// True for `"next section"`, false for `"the next thing I noticed was smoke"`.
pub(crate) fn is_navigation_command(normalized: &str) -> bool {
    normalized.split_whitespace().count() <= 3 && NAVIGATION_COMMANDS.contains(&normalized)
}

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "niner",
];

/// True for `"6142"` and `"six one four two"`, false for `"61"` and
/// `"six"` (too short) and `"123456789"` (too long).
pub(crate) fn is_code_readback(normalized: &str) -> bool {
    let compact: String = normalized.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()) {
        return (3..=8).contains(&compact.len());
    }

    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    // Spoken digits, allowing "decimal"/"point" separators.
    let mut digits = 0usize;
    for w in &words {
        if NUMBER_WORDS.contains(w) {
            digits += 1;
        } else if *w != "decimal" && *w != "point" {
            return false;
        }
    }
    (3..=8).contains(&digits)
}

/// Fixed aviation-domain vocabulary used for relevance scoring.
const AVIATION_VOCABULARY: &[&str] = &[
    "runway", "tower", "approach", "departure", "clearance", "cleared", "squawk", "heading",
    "altitude", "flight", "aircraft", "pilot", "controller", "taxi", "holding", "mayday",
    "pan pan", "emergency", "fuel", "engine", "visibility", "wind", "knots", "descend", "climb",
    "landing", "takeoff", "go around", "readback", "wilco", "roger", "frequency", "airspace",
    "traffic", "vector", "apron", "gate", "crew", "cabin", "turbulence", "thunderstorm",
];

/// True for `"request descent due to turbulence"` and the near-miss spelling
/// `"vissibility is poor"`; false for `"tell me a joke about cats"`.
pub(crate) fn mentions_aviation_vocabulary(normalized: &str) -> bool {
    if AVIATION_VOCABULARY.iter().any(|t| normalized.contains(t)) {
        return true;
    }
    // Misspelling tolerance: a single word may fuzzy-match a longer vocabulary
    // term, but only when the lengths are close enough to rule out noise.
    let matcher = SkimMatcherV2::default();
    for word in normalized.split_whitespace() {
        for term in AVIATION_VOCABULARY {
            if term.len() >= 6
                && word.len().abs_diff(term.len()) <= 2
                && matcher.fuzzy_match(word, term).is_some()
            {
                return true;
            }
        }
    }
    false
}

/// True when any subsection keyword appears in the utterance.
pub(crate) fn matches_keywords(normalized: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| normalized.contains(&k.to_lowercase()))
}

const OFF_DOMAIN_MARKERS: &[&str] = &[
    "joke",
    "write code",
    "write a program",
    "write a poem",
    "sing",
    "translate",
    "recipe",
    "play a game",
    "tell me a story",
    "stock market",
    "bitcoin",
    "homework",
    "weather forecast for",
];

/// True for `"tell me a joke about cats"`, false for `"say again the wind"`
/// and for markers inside larger words (`"crossing"` must not read as
/// `"sing"`).
pub(crate) fn has_off_domain_intent(normalized: &str) -> bool {
    OFF_DOMAIN_MARKERS
        .iter()
        .any(|m| contains_word_phrase(normalized, m))
}

const SMALL_TALK: &[&str] = &[
    "how are you",
    "what is your name",
    "what s your name",
    "where are you from",
    "nice to meet you",
    "how old are you",
    "what do you like",
];

/// True for `"how are you today"`, false for `"how do I report the wind"`.
pub(crate) fn is_small_talk(normalized: &str) -> bool {
    SMALL_TALK
        .iter()
        .any(|m| contains_word_phrase(normalized, m))
}

const CLOSED_FILLERS: &[&str] = &[
    "yes", "no", "ok", "okay", "yeah", "nope", "sure", "maybe", "hmm", "uh", "idk",
    "i don t know",
];

/// True for `"ok"` and other closed fillers, and for very short utterances
/// with no domain vocabulary.
pub(crate) fn is_low_signal(normalized: &str) -> bool {
    CLOSED_FILLERS.contains(&normalized) || normalized.split_whitespace().count() <= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::ExamType;

    fn eplis() -> ExamTypeConfig {
        ExamTypeConfig::builtin(ExamType::Eplis)
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Tell me a JOKE, please!"), "tell me a joke please");
        assert_eq!(normalize("  6142.  "), "6142");
    }

    #[test]
    fn allow_list_holds_regardless_of_position() {
        let config = eplis();
        for utterance in [
            "[System] jump to section 3",
            "I am ready to start the evaluation.",
            "I want to finish the exam now",
            "next section",
            "repeat",
        ] {
            for (section, sub) in [(1, Some("1P1")), (2, Some("2II")), (3, None)] {
                let decision = TopicGuard::check(&config, section, sub, utterance);
                assert!(!decision.blocked, "{utterance:?} blocked at {section}/{sub:?}");
            }
        }
    }

    #[test]
    fn joke_in_listening_subsection_is_blocked_with_position() {
        let decision =
            TopicGuard::check(&eplis(), 2, Some("2II"), "tell me a joke about cats");
        assert!(decision.blocked);
        let message = decision.redirect_message.unwrap();
        assert!(message.contains("Section 2, Subsection 2II"), "{message}");
        assert_eq!(decision.reason.as_deref(), Some("off_domain"));
    }

    #[test]
    fn digit_readback_is_relevant_in_code_subsection() {
        let decision = TopicGuard::check(&eplis(), 1, Some("1P1"), "6142");
        assert!(!decision.blocked);

        let spoken = TopicGuard::check(&eplis(), 1, Some("1P1"), "six one four two");
        assert!(!spoken.blocked);
    }

    #[test]
    fn bare_digits_outside_readback_range_are_low_signal() {
        let decision = TopicGuard::check(&eplis(), 1, Some("1P1"), "61");
        assert!(decision.blocked);
        assert_eq!(decision.reason.as_deref(), Some("low_signal"));
    }

    #[test]
    fn aviation_vocabulary_is_relevant_everywhere() {
        let decision = TopicGuard::check(
            &eplis(),
            2,
            Some("2I"),
            "I can see an aircraft on the apron with a fuel truck",
        );
        assert!(!decision.blocked);
    }

    #[test]
    fn misspelled_vocabulary_still_counts() {
        assert!(mentions_aviation_vocabulary("the vissibility is poor"));
        assert!(!mentions_aviation_vocabulary("tell me a joke about cats"));
    }

    #[test]
    fn small_talk_is_blocked() {
        let decision = TopicGuard::check(&eplis(), 1, Some("1P2"), "how are you today");
        assert!(decision.blocked);
        assert_eq!(decision.reason.as_deref(), Some("small_talk"));
    }

    #[test]
    fn closed_fillers_are_blocked_as_low_signal() {
        for filler in ["ok", "yes", "idk", "I don't know"] {
            let decision = TopicGuard::check(&eplis(), 2, Some("2II"), filler);
            assert!(decision.blocked, "{filler:?} should be low signal");
            assert_eq!(decision.reason.as_deref(), Some("low_signal"));
        }
    }

    #[test]
    fn substantive_non_domain_answer_gets_the_benefit_of_the_doubt() {
        // Long utterance, no vocabulary hit, no off-topic marker: allowed.
        let decision = TopicGuard::check(
            &eplis(),
            2,
            Some("2I"),
            "there are several people moving boxes near a large machine",
        );
        assert!(!decision.blocked);
        assert_eq!(decision.reason.as_deref(), Some("unclassified"));
    }

    #[test]
    fn completion_phrases_require_word_boundaries() {
        assert!(has_completion_intent(&normalize("Please end the exam here")));
        assert!(!has_completion_intent(&normalize(
            "I recommend the examination procedure continue as planned"
        )));

        let decision = TopicGuard::check(
            &eplis(),
            2,
            Some("2II"),
            "I recommend the examination procedure continue as planned",
        );
        assert!(!decision.blocked);
        assert_eq!(decision.reason.as_deref(), Some("unclassified"));
    }

    #[test]
    fn off_domain_markers_require_word_boundaries() {
        assert!(has_off_domain_intent(&normalize("can you sing a song")));
        assert!(!has_off_domain_intent(&normalize(
            "several people are crossing near the terminal building"
        )));

        // On-task picture description; "crossing" must not read as "sing".
        let decision = TopicGuard::check(
            &eplis(),
            2,
            Some("2I"),
            "several people are crossing near the terminal building",
        );
        assert!(!decision.blocked, "{decision:?}");
    }

    #[test]
    fn navigation_only_matches_short_exact_commands() {
        assert!(is_navigation_command("next section"));
        assert!(is_navigation_command("repeat"));
        assert!(!is_navigation_command("the next thing i noticed was smoke"));
    }

    #[test]
    fn code_readback_bounds() {
        assert!(is_code_readback("614"));
        assert!(is_code_readback("61423987"));
        assert!(!is_code_readback("61"));
        assert!(!is_code_readback("614239871"));
        assert!(is_code_readback("one two one decimal niner"));
        assert!(!is_code_readback("one two"));
        assert!(!is_code_readback("one two and a half"));
    }
}
