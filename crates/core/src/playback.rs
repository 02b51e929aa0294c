//! Playback policy resolution.
//!
//! A pure, total lookup of replay/seek/pause rules keyed by exam type and
//! recording class. Unconfigured combinations resolve to the strictest
//! policy — fail-safe-strict, never fail-open.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exam::ExamTypeConfig;

/// Whether a recording is part of the graded exam material or general audio
/// (ambience, instructions).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordingClass {
    ExamRecording,
    GeneralAudio,
}

/// Rules governing how a recording may be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlaybackPolicy {
    pub allow_seek: bool,
    pub allow_pause: bool,
    /// 0 means the recording plays once and may never be replayed.
    pub max_replays: u32,
}

impl PlaybackPolicy {
    /// No seek, no pause, zero replays.
    pub const STRICTEST: PlaybackPolicy = PlaybackPolicy {
        allow_seek: false,
        allow_pause: false,
        max_replays: 0,
    };
}

/// Resolves the playback policy for a recording class under an exam type.
pub struct PlaybackPolicyResolver;

impl PlaybackPolicyResolver {
    /// Total: always returns a policy, defaulting to [`PlaybackPolicy::STRICTEST`].
    pub fn resolve(config: &ExamTypeConfig, class: RecordingClass) -> PlaybackPolicy {
        config
            .playback
            .get(&class)
            .copied()
            .unwrap_or(PlaybackPolicy::STRICTEST)
    }
}
