use chrono::Local;
use log::warn;
use std::sync::Arc;

use crate::store::{ConversationLog, ConversationLogEntry};

use super::{AnalysisCall, AnalysisError, AnalysisService};

/// Wraps a service and writes one conversation-log line per call that
/// actually reached it. Calls rejected for missing configuration never left
/// the process and are not recorded.
pub struct RecordingAnalysis<S> {
    inner: S,
    log: Arc<ConversationLog>,
}

impl<S> RecordingAnalysis<S> {
    pub fn new(inner: S, log: Arc<ConversationLog>) -> Self {
        Self { inner, log }
    }
}

impl<S: AnalysisService> AnalysisService for RecordingAnalysis<S> {
    fn analyze(&self, call: &AnalysisCall<'_>) -> Result<String, AnalysisError> {
        let result = self.inner.analyze(call);

        if matches!(result, Err(AnalysisError::NotConfigured(_))) {
            return result;
        }

        let (reply, error) = match &result {
            Ok(reply) => (reply.clone(), None),
            Err(err) => (String::new(), Some(err.to_string())),
        };
        let entry = ConversationLogEntry {
            time: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            model: call.role.model.clone(),
            user_input_content: call.user_text.to_string(),
            system_prompt: call.system_prompt().to_string(),
            image: ConversationLogEntry::image_label(call.image),
            reply,
            error,
        };

        if let Err(err) = self.log.append(&entry) {
            warn!("Failed to record analysis call: {err:#}");
        }

        result
    }
}
