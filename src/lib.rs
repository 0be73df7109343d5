//! Multimodal triage: vitals, face and voice signals fused into one decision.
//!
//! Each modality produces a bounded 0-100 score with a status saying where the
//! score came from. The scores are fused with fixed weights plus a critical
//! override, and an ordered rule table turns the fused score into an urgency tier,
//! a time-to-risk estimate and a condition label.
//!
//! Pretrained models (vitals risk, voice stress, landmarks, emotion) and the
//! narrative writer are injected through the traits in [`classifier`] and
//! [`narrative`]; the crate never loads or runs a model itself.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitalyn_triage::{AnalysisRequest, PrecomputedClassifier, TriageEngine, VitalsReading};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let vitals = VitalsReading::from_json(
//!     r#"{"heart_rate":130,"bp_systolic":180,"bp_diastolic":110,"spo2":85,
//!         "temperature":39.5,"pain_level":9,"fatigue_level":9}"#,
//! )?;
//! let engine = TriageEngine::builder()
//!     .vitals_classifier(Arc::new(PrecomputedClassifier::from_probabilities(vec![0.05, 0.95])?))
//!     .build();
//! let report = engine.analyze(AnalysisRequest::new(vitals)).await?;
//! println!("{} ({})", report.triage.condition, report.fused_risk);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod face;
pub mod fusion;
pub mod modality;
pub mod narrative;
pub mod triage;
pub mod vitals;
pub mod voice;

pub use classifier::{ClassPrediction, ClassifierError, PrecomputedClassifier};
pub use config::EngineConfig;
pub use engine::{AnalysisReport, AnalysisRequest, FaceInput, TriageEngine, TriageError};
pub use face::{FaceAnalyzer, FaceAssessment, FrameObservation};
pub use fusion::{fuse, FusionConfig};
pub use modality::{ModalityScores, ModalityStatus};
pub use narrative::{NarrativeGenerator, RuleBasedNarrator, SoapNote};
pub use triage::{classify, recommendation, TriageDecision, TriageThresholds, TtrLevel, Urgency};
pub use vitals::{VitalsAdapter, VitalsReading, VitalsRisk};
pub use voice::{VoiceEvaluator, VoiceStress};
