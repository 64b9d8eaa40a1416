use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use shared::{
    domain::{AnalysisMode, ImageHandle},
    protocol::{
        AnalysisResult, CandidateType, ClassificationResult, PredictionResult, RiskLevel,
    },
};
use tracing::debug;

use crate::{analysis::AnalysisBackend, error::WorkflowError};

pub const DEFAULT_ANALYSIS_LATENCY: Duration = Duration::from_millis(2000);

const CARCINOMA_TYPES: [&str; 4] = [
    "Adenocarcinoma",
    "Squamous cell carcinoma",
    "Small cell carcinoma",
    "Large cell carcinoma",
];

const MALIGNANCY_LEVELS: [&str; 3] = [
    "Low-grade malignancy",
    "Intermediate-grade malignancy",
    "High-grade malignancy",
];

const CHARACTERISTICS: [&str; 6] = [
    "Irregular margins",
    "Heterogeneous density",
    "Calcifications present",
    "Spiculated border",
    "Central necrosis",
    "Increased FDG uptake",
];

/// Fabricates results after a fixed delay. Output depends only on the
/// image's origin reference and the mode.
#[derive(Debug, Clone)]
pub struct MockAnalysisBackend {
    latency: Duration,
}

impl Default for MockAnalysisBackend {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_LATENCY)
    }
}

impl MockAnalysisBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub async fn analyze_reference(
        &self,
        origin_ref: &str,
        mode: AnalysisMode,
    ) -> Result<AnalysisResult, WorkflowError> {
        if origin_ref.trim().is_empty() {
            return Err(WorkflowError::validation("image reference must not be empty"));
        }
        tokio::time::sleep(self.latency).await;
        debug!(origin_ref, %mode, "fabricated analysis result");
        Ok(synthesize(origin_ref, mode))
    }
}

#[async_trait]
impl AnalysisBackend for MockAnalysisBackend {
    async fn submit(
        &self,
        image: &ImageHandle,
        mode: AnalysisMode,
    ) -> Result<AnalysisResult, WorkflowError> {
        self.analyze_reference(&image.origin_ref, mode).await
    }
}

pub fn synthesize(origin_ref: &str, mode: AnalysisMode) -> AnalysisResult {
    let digest = Sha256::digest(format!("{mode}:{origin_ref}").as_bytes());
    let seed = digest.as_slice();
    match mode {
        AnalysisMode::Prediction => AnalysisResult::Prediction(prediction(seed)),
        AnalysisMode::Classification => AnalysisResult::Classification(classification(seed)),
    }
}

fn prediction(seed: &[u8]) -> PredictionResult {
    // 1.0 ..= 10.0 mm/year in tenths.
    let tenths = 10 + u16::from_be_bytes([seed[0], seed[1]]) % 91;
    let risk_level = match tenths {
        0..=29 => RiskLevel::Low,
        30..=69 => RiskLevel::Medium,
        _ => RiskLevel::High,
    };
    let recommendations: &[&str] = match risk_level {
        RiskLevel::Low => &[
            "Repeat imaging every 6 months",
            "Track tumor size at each visit",
        ],
        RiskLevel::Medium => &[
            "Repeat imaging every 3 months",
            "Closely monitor changes in tumor size",
            "Consider adjuvant therapy options",
        ],
        RiskLevel::High => &[
            "Repeat imaging every month",
            "Refer the case to a multidisciplinary tumor board",
            "Begin treatment planning promptly",
        ],
    };

    PredictionResult {
        growth_rate: format!("{}.{} mm/year", tenths / 10, tenths % 10),
        risk_level,
        recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
    }
}

fn classification(seed: &[u8]) -> ClassificationResult {
    let primary = usize::from(seed[2]) % CARCINOMA_TYPES.len();
    let confidence = 60 + seed[3] % 36;

    let remainder = u32::from(100 - confidence);
    let second = remainder * 60 / 100;
    let fourth = (remainder - second) / 2;
    let third = remainder - second - fourth;

    let mut others: Vec<&str> = CARCINOMA_TYPES
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != primary)
        .map(|(_, name)| *name)
        .collect();
    let shift = usize::from(seed[4]) % others.len();
    others.rotate_left(shift);

    let mut possible_types = vec![CandidateType {
        name: CARCINOMA_TYPES[primary].to_string(),
        probability: confidence,
    }];
    for (name, probability) in others.into_iter().zip([second, third, fourth]) {
        possible_types.push(CandidateType {
            name: name.to_string(),
            probability: u8::try_from(probability).unwrap_or(0),
        });
    }

    let first = usize::from(seed[6]) % CHARACTERISTICS.len();
    let mut picks = vec![first, (first + 1 + usize::from(seed[7]) % 5) % CHARACTERISTICS.len()];
    if seed[8] % 2 == 0 {
        picks.push((first + 3) % CHARACTERISTICS.len());
    }

    ClassificationResult {
        primary_type: CARCINOMA_TYPES[primary].to_string(),
        confidence,
        possible_types,
        malignancy_level: MALIGNANCY_LEVELS[usize::from(seed[5]) % MALIGNANCY_LEVELS.len()]
            .to_string(),
        characteristics: picks
            .into_iter()
            .map(|index| CHARACTERISTICS[index].to_string())
            .collect(),
    }
}
