//! Scripted analysis service for tests.

use std::{
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use super::{AnalysisCall, AnalysisError, AnalysisService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
    pub image: Option<PathBuf>,
}

type Responder = Box<dyn Fn(&RecordedCall) -> Result<String, AnalysisError> + Send + Sync>;

pub struct FakeAnalysis {
    respond: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeAnalysis {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<String, AnalysisError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn image_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.image.is_some())
            .collect()
    }

    pub fn text_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.image.is_none())
            .collect()
    }
}

impl AnalysisService for FakeAnalysis {
    fn analyze(&self, call: &AnalysisCall<'_>) -> Result<String, AnalysisError> {
        let recorded = RecordedCall {
            model: call.role.model.clone(),
            system_prompt: call.system_prompt().to_string(),
            user_text: call.user_text.to_string(),
            image: call.image.map(PathBuf::from),
        };
        let reply = (self.respond)(&recorded);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recorded);
        reply
    }
}
