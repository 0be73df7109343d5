//! Clinical note generation
//!
//! The engine hands a [`NarrativeContext`] to an injected [`NarrativeGenerator`]
//! (typically an LLM client) and falls back to [`RuleBasedNarrator`] when none is
//! configured or it fails. A missing note never fails an analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::face::FaceAssessment;
use crate::vitals::{VitalsModelKind, VitalsReading, VitalsRisk};
use crate::voice::VoiceStress;

/// Placeholder subjective input when nothing was transcribed
pub const NO_TRANSCRIPT: &str = "[No verbal input recorded]";

// ============================================================================
// Types
// ============================================================================

/// Errors reported by a narrative generator
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("Narrative generator unavailable: {0}")]
    Unavailable(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid note: {0}")]
    InvalidNote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Critical,
    Watch,
    Stable,
}

/// Structured SOAP note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapNote {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    pub alert_level: AlertLevel,
    pub reasoning: String,
    /// Name of the generator that wrote the note
    #[serde(default)]
    pub generated_by: String,
}

/// Everything a generator may look at
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeContext {
    pub timestamp: DateTime<Utc>,
    pub vitals: VitalsReading,
    pub vitals_analysis: VitalsRisk,
    pub face_analysis: FaceAssessment,
    pub voice_analysis: VoiceStress,
    pub transcript: Option<String>,
}

impl NarrativeContext {
    pub fn transcript_or_placeholder(&self) -> &str {
        self.transcript
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(NO_TRANSCRIPT)
    }
}

/// Writes a SOAP note from a narrative context
pub trait NarrativeGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, context: &NarrativeContext) -> Result<SoapNote, NarrativeError>;
}

// ============================================================================
// Parsing
// ============================================================================

/// Pull the outermost JSON object out of a model response, dropping code fences
fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

impl SoapNote {
    /// Parse a generator's JSON reply (optionally wrapped in markdown fences).
    ///
    /// For [`NarrativeGenerator`] implementations backed by a language model:
    /// call this on the raw completion text and return its error as-is, so the
    /// engine falls back to the rule-based note on a malformed reply.
    pub fn from_model_response(response: &str) -> Result<Self, NarrativeError> {
        let json = extract_json_object(response)
            .ok_or_else(|| NarrativeError::InvalidNote("No JSON object in response".to_string()))?;
        let note: SoapNote =
            serde_json::from_str(json).map_err(|e| NarrativeError::InvalidNote(e.to_string()))?;
        if note.assessment.trim().is_empty() {
            return Err(NarrativeError::InvalidNote("Empty assessment".to_string()));
        }
        debug!(
            "Parsed SOAP note: S={} O={} A={} P={} chars",
            note.subjective.len(),
            note.objective.len(),
            note.assessment.len(),
            note.plan.len()
        );
        Ok(note)
    }
}

// ============================================================================
// Rule-based fallback
// ============================================================================

/// Offline narrator driven by the vitals risk score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleBasedNarrator {
    pub critical_above: f32,
    pub watch_above: f32,
}

impl Default for RuleBasedNarrator {
    fn default() -> Self {
        Self {
            critical_above: 80.0,
            watch_above: 50.0,
        }
    }
}

impl RuleBasedNarrator {
    pub const NAME: &'static str = "rule_based";

    /// Always succeeds
    pub fn write(&self, context: &NarrativeContext) -> SoapNote {
        let vitals = &context.vitals_analysis;
        let risk = vitals.risk_score;
        // Class 1 of the binary model is the positive (sepsis) class
        let positive_class = vitals.model_used == Some(VitalsModelKind::Binary)
            && vitals.risk_class == Some(1);

        let (alert_level, assessment, plan) = if risk > self.critical_above || positive_class {
            (
                AlertLevel::Critical,
                "Potential sepsis detected based on vital signs.",
                "Initiate sepsis protocol (lactate, cultures, antibiotics). Immediate MD evaluation.",
            )
        } else if risk > self.watch_above {
            (
                AlertLevel::Watch,
                "Abnormal vitals detected. Patient showing signs of physiological stress.",
                "Repeat vitals in 15 mins. Observe for deterioration.",
            )
        } else {
            (
                AlertLevel::Stable,
                "Patient is stable.",
                "Continue monitoring.",
            )
        };

        let r = &context.vitals;
        SoapNote {
            subjective: format!("Patient input: {}", context.transcript_or_placeholder()),
            objective: format!(
                "HR: {} bpm. BP: {}/{} mmHg. SpO2: {}%. Temp: {} C. Pain: {}/10. \
                 Face fatigue: {}/100. Voice stress: {}/100.",
                r.heart_rate,
                r.bp_systolic,
                r.bp_diastolic,
                r.spo2,
                r.temperature,
                r.pain_level,
                context.face_analysis.fatigue_level,
                context.voice_analysis.stress_score
            ),
            assessment: assessment.to_string(),
            plan: plan.to_string(),
            alert_level,
            reasoning: format!("Rule-based note. Vitals risk score: {}", risk),
            generated_by: Self::NAME.to_string(),
        }
    }
}

impl NarrativeGenerator for RuleBasedNarrator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate(&self, context: &NarrativeContext) -> Result<SoapNote, NarrativeError> {
        Ok(self.write(context))
    }
}

/// Run `generator` and fall back to the rule-based note on any failure
pub fn write_note(
    generator: Option<&dyn NarrativeGenerator>,
    context: &NarrativeContext,
) -> SoapNote {
    let fallback = RuleBasedNarrator::default();
    let Some(generator) = generator else {
        return fallback.write(context);
    };

    match generator.generate(context) {
        Ok(mut note) => {
            if note.generated_by.is_empty() {
                note.generated_by = generator.name().to_string();
            }
            info!("Clinical note written by {}", generator.name());
            note
        }
        Err(e) => {
            warn!("{} failed, using rule-based note: {}", generator.name(), e);
            fallback.write(context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FaceAssessment;
    use crate::modality::ModalityStatus;
    use crate::vitals::RiskProbabilities;

    fn reading() -> VitalsReading {
        VitalsReading {
            heart_rate: 130.0,
            bp_systolic: 180.0,
            bp_diastolic: 110.0,
            spo2: 85.0,
            temperature: 39.5,
            pain_level: 9,
            fatigue_level: 9,
        }
    }

    fn context(risk_score: f32, risk_class: usize, model: VitalsModelKind) -> NarrativeContext {
        NarrativeContext {
            timestamp: Utc::now(),
            vitals: reading(),
            vitals_analysis: VitalsRisk {
                status: ModalityStatus::Ok,
                risk_score,
                risk_class: Some(risk_class),
                probabilities: Some(RiskProbabilities::default()),
                model_used: Some(model),
                error: None,
            },
            face_analysis: FaceAssessment::empty(ModalityStatus::NotProvided),
            voice_analysis: VoiceStress::empty(ModalityStatus::NotProvided),
            transcript: None,
        }
    }

    struct FailingGenerator;

    impl NarrativeGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "remote"
        }

        fn generate(&self, _context: &NarrativeContext) -> Result<SoapNote, NarrativeError> {
            Err(NarrativeError::Unavailable("no API key".to_string()))
        }
    }

    struct CannedGenerator(&'static str);

    impl NarrativeGenerator for CannedGenerator {
        fn name(&self) -> &str {
            "canned"
        }

        fn generate(&self, _context: &NarrativeContext) -> Result<SoapNote, NarrativeError> {
            SoapNote::from_model_response(self.0)
        }
    }

    #[test]
    fn test_rule_based_alert_levels() {
        let narrator = RuleBasedNarrator::default();
        let critical = narrator.write(&context(95.0, 2, VitalsModelKind::ThreeClass));
        assert_eq!(critical.alert_level, AlertLevel::Critical);
        assert!(critical.plan.contains("sepsis protocol"));

        let watch = narrator.write(&context(60.0, 1, VitalsModelKind::ThreeClass));
        assert_eq!(watch.alert_level, AlertLevel::Watch);

        let stable = narrator.write(&context(20.0, 0, VitalsModelKind::ThreeClass));
        assert_eq!(stable.alert_level, AlertLevel::Stable);
        assert_eq!(stable.generated_by, RuleBasedNarrator::NAME);
    }

    #[test]
    fn test_binary_positive_class_is_critical() {
        let note = RuleBasedNarrator::default().write(&context(45.0, 1, VitalsModelKind::Binary));
        assert_eq!(note.alert_level, AlertLevel::Critical);
    }

    #[test]
    fn test_transcript_placeholder() {
        let mut ctx = context(10.0, 0, VitalsModelKind::Binary);
        let note = RuleBasedNarrator::default().write(&ctx);
        assert!(note.subjective.contains(NO_TRANSCRIPT));
        assert!(note.objective.starts_with("HR: 130 bpm"));

        ctx.transcript = Some("Chest feels tight".to_string());
        let note = RuleBasedNarrator::default().write(&ctx);
        assert_eq!(note.subjective, "Patient input: Chest feels tight");
    }

    #[test]
    fn test_failing_generator_falls_back() {
        let ctx = context(95.0, 2, VitalsModelKind::ThreeClass);
        let note = write_note(Some(&FailingGenerator), &ctx);
        assert_eq!(note.generated_by, RuleBasedNarrator::NAME);
        assert_eq!(note.alert_level, AlertLevel::Critical);
    }

    #[test]
    fn test_fenced_model_response() {
        let response = "```json\n{\"subjective\":\"s\",\"objective\":\"o\",\"assessment\":\"a\",\
                        \"plan\":\"p\",\"alert_level\":\"Watch\",\"reasoning\":\"r\"}\n```";
        let ctx = context(10.0, 0, VitalsModelKind::Binary);
        let note = write_note(Some(&CannedGenerator(response)), &ctx);
        assert_eq!(note.alert_level, AlertLevel::Watch);
        assert_eq!(note.generated_by, "canned");
    }

    #[test]
    fn test_invalid_model_response() {
        assert!(matches!(
            SoapNote::from_model_response("Sorry, I cannot help"),
            Err(NarrativeError::InvalidNote(_))
        ));
        assert!(SoapNote::from_model_response("{\"subjective\": 1}").is_err());
    }
}
