//! Runtime directive synthesis.
//!
//! A pure function from `(exam config, section, subsection, utterance)` to an
//! ephemeral system-prompt fragment for the current turn, or `None` when no
//! rule fires. Rules are independent predicates; when several fire their
//! texts are concatenated under a fixed header in a fixed priority order,
//! completion first. Deterministic and side-effect free.

use crate::exam::{ExamType, ExamTypeConfig, TaskKind};
use crate::guard;

/// Fixed header under which directives are spliced into the system prompt.
pub const DIRECTIVE_HEADER: &str = "## Examiner runtime directives (this turn only)";

/// The exact closing sentence mandated when the candidate asks to finish.
pub const CLOSING_SENTENCE: &str =
    "This concludes your evaluation. Thank you, your results will be available shortly.";

/// Builds the directive fragment for one turn.
pub struct RuntimeDirectiveBuilder;

impl RuntimeDirectiveBuilder {
    /// Returns the directive string for this turn, or `None` when no rule
    /// applies (e.g. the position does not exist under this exam type).
    pub fn build(
        config: &ExamTypeConfig,
        section: u32,
        subsection: Option<&str>,
        utterance: &str,
    ) -> Option<String> {
        let normalized = guard::normalize(utterance);
        let task = subsection
            .and_then(|id| config.subsection(id))
            .filter(|(s, _)| *s == section)
            .map(|(_, sub)| sub.task);

        let mut lines: Vec<&'static str> = Vec::new();

        // Priority 1: completion intent mandates the tool call and the exact
        // closing sentence.
        if guard::has_completion_intent(&normalized) {
            lines.push(
                "The candidate has asked to end the evaluation. Call the `section_control` \
                 tool with action `completeExam` now, then close with exactly: \
                 \"This concludes your evaluation. Thank you, your results will be \
                 available shortly.\"",
            );
        }

        // Priority 2: a substantive answer to the current recording means the
        // candidate already pressed play; do not tell them to press it again.
        if is_substantive_listening_answer(task, &normalized) {
            lines.push(
                "The candidate has already answered the current recording. Do not instruct \
                 them to press play again; evaluate the answer they just gave.",
            );
        }

        // Priority 3: subsection-specific formatting constraints.
        match (config.exam_type, task) {
            (ExamType::Eplis, Some(TaskKind::RolePlay)) => {
                lines.push(
                    "Role play: ask exactly one question per turn, and never prefix your \
                     lines with role labels such as 'Controller:' or 'Pilot:'.",
                );
            }
            (ExamType::Eplis, Some(TaskKind::ImageDiscussion)) => {
                lines.push(
                    "Picture discussion: ask one follow-up question at a time and keep \
                     each question under twenty words.",
                );
            }
            (ExamType::Sdea, Some(TaskKind::CodeReadback)) => {
                lines.push(
                    "Readback: speak codes digit by digit; never group digits into larger \
                     numbers.",
                );
            }
            _ => {}
        }

        if lines.is_empty() {
            return None;
        }
        let mut out = String::from(DIRECTIVE_HEADER);
        for line in lines {
            out.push_str("\n- ");
            out.push_str(line);
        }
        Some(out)
    }
}

/// True when the utterance reads as an actual answer to a listening task:
/// either a code readback in a readback subsection, or a multi-word on-topic
/// answer in a listening subsection.
fn is_substantive_listening_answer(task: Option<TaskKind>, normalized: &str) -> bool {
    match task {
        Some(TaskKind::CodeReadback) => guard::is_code_readback(normalized),
        Some(TaskKind::Listening) => {
            normalized.split_whitespace().count() >= 4
                && guard::mentions_aviation_vocabulary(normalized)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eplis() -> ExamTypeConfig {
        ExamTypeConfig::builtin(ExamType::Eplis)
    }

    fn sdea() -> ExamTypeConfig {
        ExamTypeConfig::builtin(ExamType::Sdea)
    }

    #[test]
    fn completion_intent_fires_first_with_exact_closing_sentence() {
        let directive = RuntimeDirectiveBuilder::build(
            &eplis(),
            3,
            Some("3RP"),
            "I want to finish the exam now",
        )
        .unwrap();
        assert!(directive.starts_with(DIRECTIVE_HEADER));
        let completion_at = directive.find("completeExam").unwrap();
        let role_play_at = directive.find("Role play").unwrap();
        assert!(completion_at < role_play_at);
        assert!(directive.contains(CLOSING_SENTENCE));
    }

    #[test]
    fn substantive_listening_answer_suppresses_press_play() {
        let directive = RuntimeDirectiveBuilder::build(
            &eplis(),
            2,
            Some("2II"),
            "the pilot reported a bird strike on the left engine",
        )
        .unwrap();
        assert!(directive.contains("press play"));
    }

    #[test]
    fn code_readback_answer_counts_as_substantive() {
        let directive =
            RuntimeDirectiveBuilder::build(&eplis(), 1, Some("1P1"), "6142").unwrap();
        assert!(directive.contains("press play"));
    }

    #[test]
    fn completion_rule_ignores_phrases_inside_unrelated_words() {
        // "recommend the examination" must not read as "end the exam".
        assert_eq!(
            RuntimeDirectiveBuilder::build(
                &eplis(),
                2,
                Some("2II"),
                "I recommend the examination procedure continue as planned",
            ),
            None
        );
    }

    #[test]
    fn no_rule_fires_yields_none() {
        assert_eq!(
            RuntimeDirectiveBuilder::build(&eplis(), 1, Some("1P2"), "could you clarify"),
            None
        );
    }

    #[test]
    fn unrelated_exam_type_yields_none() {
        // "3RP" exists under EPLIS only; the same position under SDEA has no
        // rules to fire.
        let utterance = "ready for the role play";
        assert!(
            RuntimeDirectiveBuilder::build(&eplis(), 3, Some("3RP"), utterance).is_some()
        );
        assert_eq!(
            RuntimeDirectiveBuilder::build(&sdea(), 3, Some("3RP"), utterance),
            None
        );
    }

    #[test]
    fn identical_inputs_yield_identical_strings() {
        let build = || {
            RuntimeDirectiveBuilder::build(
                &eplis(),
                2,
                Some("2II"),
                "the pilot reported smoke in the cargo hold",
            )
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn sdea_readback_formatting_rule() {
        let directive = RuntimeDirectiveBuilder::build(
            &sdea(),
            1,
            Some("1B"),
            "please explain the squawk code",
        )
        .unwrap();
        assert!(directive.contains("digit by digit"));
    }
}
