pub mod agent;
pub mod clock;
pub mod directive;
pub mod error;
pub mod exam;
pub mod guard;
pub mod playback;
pub mod routing;
pub mod session;
pub mod transcript;

use crate::directive::RuntimeDirectiveBuilder;
use crate::exam::ExamTypeConfig;
use crate::guard::TopicGuard;

/// Outcome of the per-turn gate that runs before any agent call.
///
/// This enum decouples the core's per-turn decision from the runtime that
/// acts on it: the runtime either forwards the utterance to the agent (with
/// an optional prompt directive spliced in) or short-circuits the turn with
/// an in-character redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnGate {
    /// Let the turn through, with an optional system-prompt fragment.
    Proceed { directive: Option<String> },
    /// Block the turn and show this redirect instead of calling the agent.
    Redirect { message: String },
}

/// Runs the guard and directive builder for one inbound candidate utterance.
pub fn evaluate_turn(
    config: &ExamTypeConfig,
    section: u32,
    subsection: Option<&str>,
    utterance: &str,
) -> TurnGate {
    let decision = TopicGuard::check(config, section, subsection, utterance);
    if decision.blocked {
        let message = decision
            .redirect_message
            .unwrap_or_else(|| "Let's stay focused on the assessment.".to_string());
        return TurnGate::Redirect { message };
    }
    let directive = RuntimeDirectiveBuilder::build(config, section, subsection, utterance);
    TurnGate::Proceed { directive }
}
