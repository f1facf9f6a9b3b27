//! The vision/chat service that turns screenshots into behavior text.
//!
//! The pipeline only knows [`AnalysisService`]: text plus an optional image
//! in, text out. Every failure mode collapses into [`AnalysisError`] and is
//! handled the same way by callers: log it, skip that call's result.

use std::{io, path::Path, path::PathBuf};
use thiserror::Error;

use crate::settings::{ModelConfig, ModelRole};

pub mod client;
pub mod recording;

#[cfg(test)]
pub(crate) mod fake;

pub use client::ChatCompletionsClient;
pub use recording::RecordingAnalysis;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis endpoint not configured: {0} is missing")]
    NotConfigured(&'static str),
    /// Network failure or a non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),
    /// Success status, but nothing usable in the body.
    #[error("analysis service returned an empty reply")]
    EmptyReply,
    #[error("failed to read image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// System message used when a role leaves its own prompt empty.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are the ScreenGuard desktop pet assistant. Answer concisely and accurately.";

/// One request. `config` is the snapshot taken at the start of the run, so
/// edits made mid-run never mix credentials from two versions.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisCall<'a> {
    pub config: &'a ModelConfig,
    pub role: &'a ModelRole,
    pub user_text: &'a str,
    pub image: Option<&'a Path>,
}

impl AnalysisCall<'_> {
    /// The first missing piece of configuration, if any.
    pub fn missing_setting(&self) -> Option<&'static str> {
        if self.config.api_key.trim().is_empty() {
            Some("api_key")
        } else if self.config.base_url.trim().is_empty() {
            Some("base_url")
        } else if self.role.model.trim().is_empty() {
            Some("model")
        } else {
            None
        }
    }

    pub fn system_prompt(&self) -> &str {
        if self.role.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.role.system_prompt
        }
    }
}

/// Synchronous, single attempt, bounded by the implementation's timeout.
pub trait AnalysisService: Send + Sync {
    fn analyze(&self, call: &AnalysisCall<'_>) -> Result<String, AnalysisError>;
}
