use chrono::Local;
use std::{sync::Arc, time::Instant};

use crate::{
    analysis::{AnalysisCall, AnalysisService},
    models::{BehaviorLogEntry, MonitorTarget, RunSummary, BEHAVIOR_TIME_FORMAT},
    settings::{JsonStore, ModelConfig},
    store::{BehaviorLog, DataPaths, TargetRegistry},
};

use super::{
    capture::{capture_to_file, CaptureFailure, CaptureOutcome},
    locator::locate,
    process_probe::is_process_running,
    DesktopBackend,
};

// Set to false to silence this module without touching RUST_LOG
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// How many of the most recent behavior entries the synthesis call sees.
pub const SYNTHESIS_TAIL_LEN: usize = 6;

const SYNTHESIS_HEADER: &str = "Here are the user's most recent application activities";
const NO_CAPTURE_PROMPT: &str =
    "Tell the user that the application screenshot feature is not working properly.";

/// Capture → analyze → log → summarize, once per call.
///
/// Targets are handled strictly one after another in slot order. Nothing in
/// a run is retried, and no failure escapes `run_once`: a target that cannot
/// be found, captured or analyzed is logged and skipped.
pub struct MonitorPipeline {
    backend: Arc<dyn DesktopBackend>,
    targets: Arc<TargetRegistry>,
    models: Arc<JsonStore<ModelConfig>>,
    behavior_log: Arc<BehaviorLog>,
    analysis: Arc<dyn AnalysisService>,
    paths: DataPaths,
}

impl MonitorPipeline {
    pub fn new(
        backend: Arc<dyn DesktopBackend>,
        targets: Arc<TargetRegistry>,
        models: Arc<JsonStore<ModelConfig>>,
        behavior_log: Arc<BehaviorLog>,
        analysis: Arc<dyn AnalysisService>,
        paths: DataPaths,
    ) -> Self {
        Self {
            backend,
            targets,
            models,
            behavior_log,
            analysis,
            paths,
        }
    }

    pub fn run_once(&self) -> RunSummary {
        let run_start = Instant::now();

        // One snapshot of each document for the whole run.
        let targets = self.targets.enabled_targets();
        let models = self.models.reload();
        log_info!("Monitoring run started with {} enabled target(s)", targets.len());

        let outcomes: Vec<CaptureOutcome> = targets
            .iter()
            .map(|target| self.capture_target(target))
            .collect();
        let captured = outcomes.iter().filter(|o| o.is_success()).count();

        let behaviors = self.analyze_captures(&targets, &outcomes, &models);

        let stamp = Local::now().format(BEHAVIOR_TIME_FORMAT).to_string();
        match self.behavior_log.append_batch(&stamp, &behaviors) {
            Ok(0) => {}
            Ok(appended) => log_info!("Appended {appended} behavior entr(ies) at {stamp}"),
            Err(err) => log_error!("Failed to append {} behavior(s): {err:#}", behaviors.len()),
        }

        let summary = self.synthesize(&models);

        log_info!(
            "Monitoring run finished in {}ms: {}/{} captured, {} analyzed, summary {} chars{}",
            run_start.elapsed().as_millis(),
            captured,
            targets.len(),
            behaviors.len(),
            summary.summary_text.chars().count(),
            if summary.warned_empty { " (empty log warning)" } else { "" }
        );

        summary
    }

    fn capture_target(&self, target: &MonitorTarget) -> CaptureOutcome {
        let backend = self.backend.as_ref();

        let result = match locate(backend, &target.exe_path) {
            Some(window) => {
                let file_path = self.paths.capture_path(target, Local::now());
                capture_to_file(backend, window, &file_path)
            }
            None => {
                let reason = if is_process_running(&target.exe_path) {
                    "running but has no visible window"
                } else {
                    "not running"
                };
                log_info!("Target {} ({}) is {reason}", target.id, target.name);
                Err(CaptureFailure::WindowNotFound(target.exe_path.clone()))
            }
        };

        match &result {
            Ok(path) => log_info!("Target {} ({}) captured to {}", target.id, target.name, path.display()),
            Err(err) => log_warn!("Skipping target {} ({}): {err}", target.id, target.name),
        }

        CaptureOutcome {
            target_id: target.id,
            result,
        }
    }

    /// One vision call per successful capture, in slot order. Failed calls
    /// contribute nothing.
    fn analyze_captures(
        &self,
        targets: &[MonitorTarget],
        outcomes: &[CaptureOutcome],
        models: &ModelConfig,
    ) -> Vec<String> {
        let mut behaviors = Vec::new();

        for (target, outcome) in targets.iter().zip(outcomes) {
            let Some(image) = outcome.image_path() else {
                continue;
            };

            let prompt = target.analysis_prompt();
            let call = AnalysisCall {
                config: models,
                role: &models.behavior_analysis,
                user_text: &prompt,
                image: Some(image),
            };

            match self.analysis.analyze(&call) {
                Ok(reply) => behaviors.push(reply),
                Err(err) => log_warn!(
                    "Analysis of target {} ({}) failed: {err}",
                    target.id,
                    target.name
                ),
            }
        }

        behaviors
    }

    fn synthesize(&self, models: &ModelConfig) -> RunSummary {
        let tail = match self.behavior_log.tail(SYNTHESIS_TAIL_LEN) {
            Ok(tail) => tail,
            Err(err) => {
                log_error!("Cannot read behavior log for synthesis: {err:#}");
                return RunSummary::default();
            }
        };

        let warned_empty = tail.is_empty();
        let prompt = synthesis_prompt(&tail);
        let call = AnalysisCall {
            config: models,
            role: &models.system_call,
            user_text: &prompt,
            image: None,
        };

        let summary_text = match self.analysis.analyze(&call) {
            Ok(reply) => reply,
            Err(err) => {
                log_warn!("Synthesis call failed: {err}");
                String::new()
            }
        };

        RunSummary {
            warned_empty,
            summary_text,
        }
    }
}

/// Prompt for the text-only summary of `recent` (oldest first).
pub fn synthesis_prompt(recent: &[BehaviorLogEntry]) -> String {
    if recent.is_empty() {
        return NO_CAPTURE_PROMPT.to_string();
    }

    let lines: Vec<String> = recent
        .iter()
        .map(|entry| format!("Time: {} Activity: {}", entry.time, entry.behavior))
        .collect();
    format!("{SYNTHESIS_HEADER}\n{}", lines.join("\n"))
}
