//! Request orchestration
//!
//! One analysis fans the three modalities out onto the blocking pool, each under
//! its own deadline, then fuses and triages whatever came back:
//!
//! ```text
//!            AnalysisRequest
//!        /          |          \
//!   vitals        face        voice      spawn_blocking + timeout each
//!        \          |          /
//!          ModalityScores -> fuse -> classify -> clinical note
//! ```
//!
//! A modality that times out, panics or fails degrades to score 0 with an explicit
//! status. Only an invalid vitals reading fails the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::{
    EmotionClassifier, FrameDecoder, LandmarkDetector, StressClassifier, VitalsClassifier,
};
use crate::config::EngineConfig;
use crate::face::{FaceAnalyzer, FaceAssessment, FrameObservation};
use crate::modality::{ModalityScores, ModalityStatus};
use crate::narrative::{write_note, NarrativeContext, NarrativeGenerator, RuleBasedNarrator, SoapNote};
use crate::triage::{classify, recommendation, TriageDecision};
use crate::vitals::{VitalsAdapter, VitalsError, VitalsReading, VitalsRisk};
use crate::voice::{VoiceEvaluator, VoiceStress};

/// Errors that abort a whole analysis
#[derive(Debug, Error)]
pub enum TriageError {
    #[error(transparent)]
    Vitals(#[from] VitalsError),
}

/// Face evidence supplied with a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceInput {
    /// Encoded clip or still image
    Video(Vec<u8>),
    /// Landmarks already extracted upstream
    Observations(Vec<FrameObservation>),
}

/// One triage request
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub vitals: VitalsReading,
    pub face: Option<FaceInput>,
    /// WAV bytes
    pub voice_audio: Option<Vec<u8>>,
    pub transcript: Option<String>,
}

impl AnalysisRequest {
    pub fn new(vitals: VitalsReading) -> Self {
        Self {
            vitals,
            face: None,
            voice_audio: None,
            transcript: None,
        }
    }

    pub fn with_face(mut self, face: FaceInput) -> Self {
        self.face = Some(face);
        self
    }

    pub fn with_voice(mut self, audio: Vec<u8>) -> Self {
        self.voice_audio = Some(audio);
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }
}

/// The result bundle returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub vitals: VitalsRisk,
    pub face: FaceAssessment,
    pub voice: VoiceStress,
    /// Clamped per-modality scores that went into fusion
    pub scores: ModalityScores,
    pub fused_risk: f32,
    pub triage: TriageDecision,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_note: Option<SoapNote>,
}

/// Why a modality task produced no result
#[derive(Debug, Clone, PartialEq)]
struct TaskFailure {
    status: ModalityStatus,
    message: String,
}

/// Run CPU-bound work on the blocking pool under a deadline.
///
/// A timed-out task keeps running to completion in the background; its result
/// is dropped.
async fn run_blocking<T, F>(label: &'static str, deadline: Duration, work: F) -> Result<T, TaskFailure>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => {
            error!("{} analysis task failed: {}", label, e);
            Err(TaskFailure {
                status: ModalityStatus::Failed,
                message: format!("{} analysis task failed: {}", label, e),
            })
        }
        Err(_) => {
            warn!("{} analysis timed out after {:?}", label, deadline);
            Err(TaskFailure {
                status: ModalityStatus::TimedOut,
                message: format!("{} analysis timed out after {} ms", label, deadline.as_millis()),
            })
        }
    }
}

/// Multimodal triage engine with injected model collaborators
#[derive(Clone)]
pub struct TriageEngine {
    config: Arc<EngineConfig>,
    vitals: VitalsAdapter,
    face: FaceAnalyzer,
    voice: VoiceEvaluator,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
    clinical_notes: bool,
}

impl TriageEngine {
    pub fn builder() -> TriageEngineBuilder {
        TriageEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyse one request. Fails only on an invalid vitals reading.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, TriageError> {
        request.vitals.validate()?;

        let analysis_id = Uuid::new_v4();
        let analyzed_at = Utc::now();
        let deadline = self.config.modality_timeout();
        info!(
            "Analysis {} started (face: {}, voice: {})",
            analysis_id,
            request.face.is_some(),
            request.voice_audio.is_some()
        );

        let AnalysisRequest {
            vitals: reading,
            face: face_input,
            voice_audio,
            transcript,
        } = request;

        let vitals_task = {
            let adapter = self.vitals.clone();
            async move {
                run_blocking("vitals", deadline, move || adapter.assess(&reading))
                    .await
                    .unwrap_or_else(|f| VitalsRisk::degraded(f.status, f.message))
            }
        };

        let face_task = {
            let analyzer = self.face.clone();
            async move {
                let Some(input) = face_input else {
                    return FaceAssessment::empty(ModalityStatus::NotProvided);
                };
                run_blocking("face", deadline, move || match input {
                    FaceInput::Video(bytes) => analyzer.analyze_video(&bytes),
                    FaceInput::Observations(frames) => analyzer.analyze_observations(&frames),
                })
                .await
                .unwrap_or_else(|f| FaceAssessment::with_error(f.status, f.message))
            }
        };

        let voice_task = {
            let evaluator = self.voice.clone();
            async move {
                let Some(audio) = voice_audio else {
                    return VoiceStress::empty(ModalityStatus::NotProvided);
                };
                run_blocking("voice", deadline, move || evaluator.evaluate_bytes(&audio))
                    .await
                    .unwrap_or_else(|f| VoiceStress::with_error(f.status, f.message))
            }
        };

        let (vitals, face, voice) = tokio::join!(vitals_task, face_task, voice_task);
        debug!(
            "Modalities: vitals={} ({}), face={} ({}), voice={} ({})",
            vitals.score(),
            vitals.status,
            face.score(),
            face.status,
            voice.score(),
            voice.status
        );

        let scores = ModalityScores::new(vitals.score(), face.score(), voice.score());
        let fused_risk = self.config.fusion.fuse(&scores);
        let triage = classify(fused_risk, &scores, &self.config.triage);

        let clinical_note = if self.clinical_notes {
            let context = NarrativeContext {
                timestamp: analyzed_at,
                vitals: reading,
                vitals_analysis: vitals.clone(),
                face_analysis: face.clone(),
                voice_analysis: voice.clone(),
                transcript,
            };
            Some(self.write_clinical_note(context).await)
        } else {
            None
        };

        info!(
            "Analysis {} complete: fused={} urgency={:?} condition={}",
            analysis_id, fused_risk, triage.urgency, triage.condition
        );

        Ok(AnalysisReport {
            analysis_id,
            analyzed_at,
            vitals,
            face,
            voice,
            scores,
            fused_risk,
            recommendation: recommendation(fused_risk).to_string(),
            triage,
            clinical_note,
        })
    }

    async fn write_clinical_note(&self, context: NarrativeContext) -> SoapNote {
        let narrator = self.narrator.clone();
        let task_context = context.clone();
        match run_blocking("narrative", self.config.narrative_timeout(), move || {
            write_note(narrator.as_deref(), &task_context)
        })
        .await
        {
            Ok(note) => note,
            Err(_) => RuleBasedNarrator::default().write(&context),
        }
    }
}

/// Builder for [`TriageEngine`]
#[derive(Default)]
pub struct TriageEngineBuilder {
    config: EngineConfig,
    vitals_classifier: Option<Arc<dyn VitalsClassifier>>,
    stress_classifier: Option<Arc<dyn StressClassifier>>,
    landmark_detector: Option<Arc<dyn LandmarkDetector>>,
    emotion_classifier: Option<Arc<dyn EmotionClassifier>>,
    frame_decoder: Option<Arc<dyn FrameDecoder>>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
    skip_clinical_notes: bool,
}

impl TriageEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn vitals_classifier(mut self, classifier: Arc<dyn VitalsClassifier>) -> Self {
        self.vitals_classifier = Some(classifier);
        self
    }

    pub fn stress_classifier(mut self, classifier: Arc<dyn StressClassifier>) -> Self {
        self.stress_classifier = Some(classifier);
        self
    }

    pub fn landmark_detector(mut self, detector: Arc<dyn LandmarkDetector>) -> Self {
        self.landmark_detector = Some(detector);
        self
    }

    pub fn emotion_classifier(mut self, classifier: Arc<dyn EmotionClassifier>) -> Self {
        self.emotion_classifier = Some(classifier);
        self
    }

    /// Replace the default still-image decoder (e.g. with a video demuxer)
    pub fn frame_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.frame_decoder = Some(decoder);
        self
    }

    pub fn narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    /// Leave `clinical_note` out of reports
    pub fn without_clinical_notes(mut self) -> Self {
        self.skip_clinical_notes = true;
        self
    }

    pub fn build(self) -> TriageEngine {
        let mut face = FaceAnalyzer::new(self.config.face.clone());
        if let Some(decoder) = self.frame_decoder {
            face = face.with_decoder(decoder);
        }
        if let Some(detector) = self.landmark_detector {
            face = face.with_detector(detector);
        }
        if let Some(classifier) = self.emotion_classifier {
            face = face.with_emotion_classifier(classifier);
        }

        let mut voice = VoiceEvaluator::new(self.config.voice.clone());
        if let Some(classifier) = self.stress_classifier {
            voice = voice.with_classifier(classifier);
        }

        let vitals = VitalsAdapter::new(self.vitals_classifier);
        info!(
            "Triage engine ready (vitals model: {}, stress model: {}, landmarks: {})",
            vitals.is_ready(),
            voice.has_classifier(),
            face.is_ready()
        );

        TriageEngine {
            config: Arc::new(self.config),
            vitals,
            face,
            voice,
            narrator: self.narrator,
            clinical_notes: !self.skip_clinical_notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassPrediction, ClassifierError, PrecomputedClassifier};
    use crate::face::FrameObservation;
    use crate::narrative::{AlertLevel, NarrativeError};
    use crate::triage::{TtrLevel, Urgency};
    use image::RgbImage;

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

    fn vitals_model(probabilities: Vec<f32>) -> Arc<PrecomputedClassifier> {
        Arc::new(PrecomputedClassifier::from_probabilities(probabilities).unwrap())
    }

    /// One second of a 200 Hz tone as 16-bit WAV
    fn sine_wav(amplitude: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..16000 {
                let s = (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16000.0).sin() * amplitude;
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    struct SlowStressModel;

    impl StressClassifier for SlowStressModel {
        fn predict(&self, _mfcc_mean: &[f32]) -> Result<ClassPrediction, ClassifierError> {
            std::thread::sleep(Duration::from_millis(400));
            Ok(ClassPrediction::new(2, vec![0.0, 0.0, 1.0]))
        }

        fn needs_features(&self) -> bool {
            false
        }
    }

    struct PanickingDetector;

    impl LandmarkDetector for PanickingDetector {
        fn detect(&self, _frame: &RgbImage) -> Result<Option<Vec<[f32; 2]>>, ClassifierError> {
            panic!("detector crashed");
        }
    }

    struct OfflineNarrator;

    impl NarrativeGenerator for OfflineNarrator {
        fn name(&self) -> &str {
            "offline"
        }

        fn generate(&self, _context: &NarrativeContext) -> Result<SoapNote, NarrativeError> {
            Err(NarrativeError::Unavailable("no API key".to_string()))
        }
    }

    #[tokio::test]
    async fn test_critical_vitals_alone() {
        let engine = TriageEngine::builder()
            .vitals_classifier(vitals_model(vec![0.05, 0.95]))
            .build();
        let report = engine.analyze(AnalysisRequest::new(reading())).await.unwrap();

        assert!((report.vitals.risk_score - 95.0).abs() < 1e-3);
        assert_eq!(report.face.status, ModalityStatus::NotProvided);
        assert_eq!(report.voice.status, ModalityStatus::NotProvided);
        assert!(report.fused_risk >= 85.0);
        assert_eq!(report.triage.urgency, Urgency::High);
        assert_eq!(report.triage.ttr_level, TtrLevel::Critical);
        assert_eq!(report.triage.condition, "Critical Decompensation");
        assert_eq!(report.recommendation, "Immediate attention required");
        assert_eq!(
            report.clinical_note.as_ref().map(|n| n.alert_level),
            Some(AlertLevel::Critical)
        );
    }

    #[tokio::test]
    async fn test_no_evidence_is_stable() {
        let engine = TriageEngine::builder().build();
        let report = engine.analyze(AnalysisRequest::new(reading())).await.unwrap();

        assert_eq!(report.vitals.status, ModalityStatus::Unavailable);
        assert_eq!(report.fused_risk, 0.0);
        assert_eq!(report.triage.urgency, Urgency::Low);
        assert_eq!(report.triage.time_to_risk, "4 hours");
        assert_eq!(report.triage.condition, "Stable");
        assert_eq!(report.recommendation, "Continue monitoring");
    }

    #[tokio::test]
    async fn test_invalid_vitals_fail_request() {
        let engine = TriageEngine::builder().build();
        let mut vitals = reading();
        vitals.spo2 = f64::NAN;
        let result = engine.analyze(AnalysisRequest::new(vitals)).await;
        assert!(matches!(result, Err(TriageError::Vitals(VitalsError::NonFinite("spo2")))));
    }

    #[tokio::test]
    async fn test_slow_voice_model_times_out_alone() {
        let mut config = EngineConfig::default();
        config.modality_timeout_ms = 50;
        let engine = TriageEngine::builder()
            .config(config)
            .vitals_classifier(vitals_model(vec![0.7, 0.3]))
            .stress_classifier(Arc::new(SlowStressModel))
            .build();

        let request = AnalysisRequest::new(reading()).with_voice(sine_wav(0.5));
        let report = engine.analyze(request).await.unwrap();

        assert_eq!(report.voice.status, ModalityStatus::TimedOut);
        assert_eq!(report.voice.stress_score, 0.0);
        assert_eq!(report.vitals.status, ModalityStatus::Ok);
        // 0.6 * 30
        assert!((report.fused_risk - 18.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_panicking_detector_is_contained() {
        let engine = TriageEngine::builder()
            .landmark_detector(Arc::new(PanickingDetector))
            .build();
        let png = {
            let mut buf = Vec::new();
            image::DynamicImage::ImageRgb8(RgbImage::new(4, 4))
                .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };
        let request = AnalysisRequest::new(reading()).with_face(FaceInput::Video(png));
        let report = engine.analyze(request).await.unwrap();
        assert_eq!(report.face.status, ModalityStatus::Failed);
        assert_eq!(report.face.fatigue_level, 0.0);
    }

    #[tokio::test]
    async fn test_face_observations_and_voice_heuristic() {
        let engine = TriageEngine::builder()
            .vitals_classifier(vitals_model(vec![0.9, 0.1]))
            .build();
        let frames = vec![FrameObservation {
            width: 640,
            height: 480,
            mean_luminance: 120.0,
            landmarks: None,
            emotion: None,
        }];
        let request = AnalysisRequest::new(reading())
            .with_face(FaceInput::Observations(frames))
            .with_voice(sine_wav(0.5));
        let report = engine.analyze(request).await.unwrap();

        assert_eq!(report.face.status, ModalityStatus::NoFace);
        assert_eq!(report.face.fatigue_level, 10.0);
        assert_eq!(report.voice.status, ModalityStatus::Ok);
        // 6 + 2 + ~14.2, voice 70.8 is severe
        assert_eq!(report.triage.condition, "Critical Decompensation");
    }

    #[tokio::test]
    async fn test_still_image_without_detector_is_unavailable() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([120, 110, 100])))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let engine = TriageEngine::builder().build();
        let request = AnalysisRequest::new(reading()).with_face(FaceInput::Video(png));
        let report = engine.analyze(request).await.unwrap();

        assert_eq!(report.face.status, ModalityStatus::Unavailable);
        assert_eq!(report.scores.face, 0.0);
    }

    #[tokio::test]
    async fn test_failing_narrator_falls_back() {
        let engine = TriageEngine::builder()
            .narrator(Arc::new(OfflineNarrator))
            .build();
        let report = engine
            .analyze(AnalysisRequest::new(reading()).with_transcript("I feel dizzy"))
            .await
            .unwrap();
        let note = report.clinical_note.unwrap();
        assert_eq!(note.generated_by, RuleBasedNarrator::NAME);
        assert_eq!(note.subjective, "Patient input: I feel dizzy");
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let engine = TriageEngine::builder().without_clinical_notes().build();
        let report = engine.analyze(AnalysisRequest::new(reading())).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["face"]["status"], "not_provided");
        assert_eq!(json["triage"]["urgency"], "low");
        assert!(json.get("clinical_note").is_none());
    }
}
