use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::AnalysisMode;

pub const MAX_PERCENT: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub image_ref: String,
    pub mode: AnalysisMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub growth_rate: String,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateType {
    pub name: String,
    pub probability: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub primary_type: String,
    pub confidence: u8,
    pub possible_types: Vec<CandidateType>,
    pub malignancy_level: String,
    pub characteristics: BTreeSet<String>,
}

/// Outcome of one analysis; the variant always matches the requested mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnalysisResult {
    Prediction(PredictionResult),
    Classification(ClassificationResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultValidationError {
    #[error("growth rate must not be empty")]
    EmptyGrowthRate,
    #[error("prediction must carry at least one recommendation")]
    NoRecommendations,
    #[error("confidence {0} is outside 0..=100")]
    ConfidenceOutOfRange(u8),
    #[error("probability {probability} for '{name}' is outside 0..=100")]
    ProbabilityOutOfRange { name: String, probability: u8 },
    #[error("candidate probabilities sum to {0}, above 100")]
    ProbabilitySumExceeded(u32),
    #[error("classification must list at least one candidate type")]
    NoCandidateTypes,
    #[error("primary type '{primary}' does not lead the candidate list (found '{first}')")]
    PrimaryTypeMismatch { primary: String, first: String },
}

impl PredictionResult {
    pub fn validate(&self) -> Result<(), ResultValidationError> {
        if self.growth_rate.trim().is_empty() {
            return Err(ResultValidationError::EmptyGrowthRate);
        }
        if self.recommendations.is_empty() {
            return Err(ResultValidationError::NoRecommendations);
        }
        Ok(())
    }
}

impl ClassificationResult {
    pub fn validate(&self) -> Result<(), ResultValidationError> {
        if self.confidence > MAX_PERCENT {
            return Err(ResultValidationError::ConfidenceOutOfRange(self.confidence));
        }

        let first = self
            .possible_types
            .first()
            .ok_or(ResultValidationError::NoCandidateTypes)?;
        if first.name != self.primary_type {
            return Err(ResultValidationError::PrimaryTypeMismatch {
                primary: self.primary_type.clone(),
                first: first.name.clone(),
            });
        }

        let mut total = 0u32;
        for candidate in &self.possible_types {
            if candidate.probability > MAX_PERCENT {
                return Err(ResultValidationError::ProbabilityOutOfRange {
                    name: candidate.name.clone(),
                    probability: candidate.probability,
                });
            }
            total += u32::from(candidate.probability);
        }
        if total > u32::from(MAX_PERCENT) {
            return Err(ResultValidationError::ProbabilitySumExceeded(total));
        }

        Ok(())
    }
}

impl AnalysisResult {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            Self::Prediction(_) => AnalysisMode::Prediction,
            Self::Classification(_) => AnalysisMode::Classification,
        }
    }

    pub fn validate(&self) -> Result<(), ResultValidationError> {
        match self {
            Self::Prediction(result) => result.validate(),
            Self::Classification(result) => result.validate(),
        }
    }

    pub fn as_prediction(&self) -> Option<&PredictionResult> {
        match self {
            Self::Prediction(result) => Some(result),
            Self::Classification(_) => None,
        }
    }

    pub fn as_classification(&self) -> Option<&ClassificationResult> {
        match self {
            Self::Classification(result) => Some(result),
            Self::Prediction(_) => None,
        }
    }
}
