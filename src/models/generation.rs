use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One form submission. Lives only as long as the call it drives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub image_url: String,
    pub api_key: String,
    pub email: String,
    pub generate_video: bool,
}

/// Echo of the submitted input. The API key is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInput {
    pub image_url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub generated_video: bool,
}

impl From<&GenerationRequest> for GenerationInput {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            image_url: request.image_url.clone(),
            email: request.email.clone(),
            generated_video: request.generate_video,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAssets {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub video: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { results: GeneratedAssets },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub input: GenerationInput,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub processing_time: f64,
}

impl GenerationResult {
    pub fn success(request: &GenerationRequest, assets: GeneratedAssets, elapsed_secs: f64) -> Self {
        Self::new(request, Outcome::Success { results: assets }, elapsed_secs)
    }

    pub fn failed(request: &GenerationRequest, error: impl Into<String>, elapsed_secs: f64) -> Self {
        Self::new(request, Outcome::Failed { error: error.into() }, elapsed_secs)
    }

    fn new(request: &GenerationRequest, outcome: Outcome, elapsed_secs: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            input: GenerationInput::from(request),
            outcome,
            processing_time: round_tenths(elapsed_secs),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn assets(&self) -> Option<&GeneratedAssets> {
        match &self.outcome {
            Outcome::Success { results } => Some(results),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failed { error } => Some(error),
        }
    }

    pub fn has_video(&self) -> bool {
        self.assets().is_some_and(|a| a.video.is_some())
    }
}

pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
