//! Language identification placeholder.
//!
//! Reports a fixed language with zero confidence. A real identifier can be
//! dropped in by implementing [`Analyzer`] under the name `"language"`; the
//! intent predictor picks up whatever label it publishes.

use serde::{Deserialize, Serialize};

use super::{features, AnalysisResult, AnalysisSet, Analyzer};
use crate::audio::AudioFrame;
use crate::buffering::FrameWindow;
use crate::error::{Result, TalkytalkError};

pub const NAME: &str = "language";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct LanguageConfig {
    /// Register the analyzer in the standard pipeline. Default: false.
    pub enabled: bool,
    /// Label reported until something better is known. Default: "unknown".
    pub default_language: String,
    /// Copied into every packet's `target_language`. Default: none.
    pub target_language: Option<String>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_language: "unknown".to_string(),
            target_language: None,
        }
    }
}

impl LanguageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_language.trim().is_empty() {
            return Err(TalkytalkError::config(
                "language.default_language must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LanguageAnalyzer {
    language: String,
}

impl LanguageAnalyzer {
    pub fn new(config: &LanguageConfig) -> Self {
        Self {
            language: config.default_language.clone(),
        }
    }
}

impl Default for LanguageAnalyzer {
    fn default() -> Self {
        Self::new(&LanguageConfig::default())
    }
}

impl Analyzer for LanguageAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn analyze(
        &mut self,
        frame: &AudioFrame,
        _window: &FrameWindow<'_>,
        _prior: &AnalysisSet,
    ) -> Result<AnalysisResult> {
        Ok(AnalysisResult::new(NAME, frame)
            .with(features::LANGUAGE, self.language.as_str())
            .with_confidence(0.0))
    }
}
