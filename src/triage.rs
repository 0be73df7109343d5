//! Triage classification
//!
//! A fixed, ordered rule table maps the fused score plus two severity flags to an
//! urgency tier, a time-to-risk estimate and a condition label. The conditions
//! overlap, so evaluation order decides: the first matching rule wins.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modality::{clamp_score, ModalityScores};

/// Per-modality cut-off triple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalityLimits {
    pub vitals: f32,
    pub face: f32,
    pub voice: f32,
}

impl ModalityLimits {
    /// Any modality at or above its limit
    pub fn any_reached(&self, scores: &ModalityScores) -> bool {
        scores.vitals >= self.vitals || scores.face >= self.face || scores.voice >= self.voice
    }
}

/// Tunable triage cut-offs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageThresholds {
    pub abnormal: ModalityLimits,
    pub severe: ModalityLimits,
    /// Fused score that is critical on its own
    pub critical_fused: f32,
    /// Fused score that needs observation on its own
    pub observation_fused: f32,
    /// Fused score that needs observation when some modality is abnormal
    pub abnormal_observation_fused: f32,
    /// Fused score that raises an early warning on its own
    pub early_warning_fused: f32,
}

impl Default for TriageThresholds {
    fn default() -> Self {
        Self {
            abnormal: ModalityLimits {
                vitals: 30.0,
                face: 40.0,
                voice: 35.0,
            },
            severe: ModalityLimits {
                vitals: 70.0,
                face: 80.0,
                voice: 70.0,
            },
            critical_fused: 85.0,
            observation_fused: 60.0,
            abnormal_observation_fused: 40.0,
            early_warning_fused: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtrLevel {
    Safe,
    Watch,
    Critical,
}

/// Facts a rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleInput {
    pub fused: f32,
    pub any_abnormal: bool,
    pub any_severe: bool,
}

/// One row of the triage table
pub struct TriageRule {
    pub matches: fn(&RuleInput, &TriageThresholds) -> bool,
    pub urgency: Urgency,
    pub ttr_level: TtrLevel,
    pub time_to_risk: &'static str,
    pub time_minutes: u32,
    pub condition: &'static str,
}

fn critical(i: &RuleInput, t: &TriageThresholds) -> bool {
    i.fused >= t.critical_fused || i.any_severe
}

fn observation(i: &RuleInput, t: &TriageThresholds) -> bool {
    i.fused >= t.observation_fused || (i.any_abnormal && i.fused >= t.abnormal_observation_fused)
}

fn early_warning(i: &RuleInput, t: &TriageThresholds) -> bool {
    i.any_abnormal || i.fused >= t.early_warning_fused
}

fn always(_: &RuleInput, _: &TriageThresholds) -> bool {
    true
}

/// Evaluated top to bottom; the last row always matches
pub static TRIAGE_RULES: [TriageRule; 4] = [
    TriageRule {
        matches: critical,
        urgency: Urgency::High,
        ttr_level: TtrLevel::Critical,
        time_to_risk: "15 min",
        time_minutes: 15,
        condition: "Critical Decompensation",
    },
    TriageRule {
        matches: observation,
        urgency: Urgency::Medium,
        ttr_level: TtrLevel::Watch,
        time_to_risk: "45 min",
        time_minutes: 45,
        condition: "Observation Required",
    },
    TriageRule {
        matches: early_warning,
        urgency: Urgency::Medium,
        ttr_level: TtrLevel::Watch,
        time_to_risk: "2 hours",
        time_minutes: 120,
        condition: "Early Warning",
    },
    TriageRule {
        matches: always,
        urgency: Urgency::Low,
        ttr_level: TtrLevel::Safe,
        time_to_risk: "4 hours",
        time_minutes: 240,
        condition: "Stable",
    },
];

/// Triage outcome handed to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub urgency: Urgency,
    pub ttr_level: TtrLevel,
    pub time_to_risk: String,
    pub time_minutes: u32,
    pub condition: String,
}

impl From<&TriageRule> for TriageDecision {
    fn from(rule: &TriageRule) -> Self {
        Self {
            urgency: rule.urgency,
            ttr_level: rule.ttr_level,
            time_to_risk: rule.time_to_risk.to_string(),
            time_minutes: rule.time_minutes,
            condition: rule.condition.to_string(),
        }
    }
}

/// Classify a fused score given the per-modality scores behind it
pub fn classify(
    fused: f32,
    scores: &ModalityScores,
    thresholds: &TriageThresholds,
) -> TriageDecision {
    let scores = ModalityScores::new(scores.vitals, scores.face, scores.voice);
    let input = RuleInput {
        fused: clamp_score(fused),
        any_abnormal: thresholds.abnormal.any_reached(&scores),
        any_severe: thresholds.severe.any_reached(&scores),
    };

    let rule = TRIAGE_RULES
        .iter()
        .find(|rule| (rule.matches)(&input, thresholds))
        .unwrap_or(&TRIAGE_RULES[TRIAGE_RULES.len() - 1]);

    debug!(
        "Triage: fused={} abnormal={} severe={} -> {}",
        input.fused, input.any_abnormal, input.any_severe, rule.condition
    );

    TriageDecision::from(rule)
}

/// Fused score above which immediate attention is recommended
pub const IMMEDIATE_ATTENTION_ABOVE: f32 = 80.0;

pub fn recommendation(fused: f32) -> &'static str {
    if fused > IMMEDIATE_ATTENTION_ABOVE {
        "Immediate attention required"
    } else {
        "Continue monitoring"
    }
}
