//! The trapping session: settings → analyze → decide → generate → QC.
//!
//! The session is a stateful facade over the pure pipeline stages. One call
//! to [`TrapSession::generate_traps`] is one logical task; long phases
//! report progress through a caller-supplied sink and poll a cancellation
//! token at every chunk boundary. Two runs over the same document and
//! settings produce identical trap ids, geometry and warnings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::TrapError;
use crate::qc::{run_qc, QcReport};
use crate::region::{build_graph, AdjacencyGraph, AdjacencyOptions};
use crate::rules::{DecisionContext, TrapDecision, TrapTag};
use crate::settings::TrapSettings;
use crate::trap::{generate_layer, TrapLayer, TrapStats};
use crate::warnings::Warning;
use crate::Document;

/// A progress update is delivered at least once per this many work units
const WORK_CHUNK: usize = 10_000;

/// Pipeline phase currently being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapPhase {
    Analyze,
    Decide,
    Generate,
    Qc,
}

/// One progress report from a running pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProgressUpdate {
    pub phase: TrapPhase,
    pub completed: usize,
    pub total: usize,
    pub current_task: String,
}

/// Caller-supplied receiver for progress updates
pub trait ProgressSink {
    fn update(&mut self, progress: &ProgressUpdate);
}

/// Sink that discards all updates
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&mut self, _progress: &ProgressUpdate) {}
}

/// Cooperative cancellation flag, checked at chunk boundaries
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared progress and cancellation plumbing handed through the pipeline
pub struct RunContext<'a> {
    sink: Option<&'a mut dyn ProgressSink>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, cancel: &'a CancelToken) -> Self {
        Self {
            sink: Some(sink),
            cancel: Some(cancel),
        }
    }

    /// Context without progress reporting or cancellation, for direct use
    /// of the pipeline stages
    pub fn unattended() -> RunContext<'static> {
        RunContext {
            sink: None,
            cancel: None,
        }
    }

    /// Registers one work unit. Returns `false` when the run is cancelled;
    /// progress is delivered at chunk boundaries and at the end of a phase.
    pub(crate) fn step(
        &mut self,
        phase: TrapPhase,
        completed: usize,
        total: usize,
        task: &str,
    ) -> bool {
        if let Some(cancel) = self.cancel {
            if cancel.is_cancelled() {
                return false;
            }
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            if completed % WORK_CHUNK == 0 || completed + 1 >= total {
                sink.update(&ProgressUpdate {
                    phase,
                    completed,
                    total,
                    current_task: task.to_string(),
                });
            }
        }
        true
    }
}

/// Everything one run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapRun {
    pub layer: TrapLayer,
    pub graph: AdjacencyGraph,
    pub warnings: Vec<Warning>,
}

/// Stateful facade over the trapping pipeline
#[derive(Debug, Default)]
pub struct TrapSession {
    settings: TrapSettings,
    adjacency: AdjacencyOptions,
    tags: Vec<TrapTag>,
    last: Option<TrapRun>,
}

impl TrapSession {
    pub fn new(settings: TrapSettings) -> Self {
        Self {
            settings,
            adjacency: AdjacencyOptions::default(),
            tags: Vec::new(),
            last: None,
        }
    }

    pub fn settings(&self) -> &TrapSettings {
        &self.settings
    }

    /// Merges a partial JSON settings fragment. Idempotent; does not
    /// invalidate a previous run result.
    pub fn update_settings(&mut self, patch: &serde_json::Value) -> Result<(), TrapError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Replaces the object-scoped trap tags used by subsequent runs
    pub fn set_tags(&mut self, tags: Vec<TrapTag>) {
        self.tags = tags;
    }

    /// Forgets the last run result
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Runs the full pipeline without progress reporting
    pub fn generate_traps(&mut self, doc: &Document) -> Result<TrapRun, TrapError> {
        let mut sink = NullProgress;
        let cancel = CancelToken::new();
        self.generate_traps_with(doc, &mut sink, &cancel)
    }

    /// Runs the full pipeline: analyze → decide → generate.
    ///
    /// Pure with respect to the input document. On cancellation the
    /// partial result is discarded and `TrapError::Cancelled` is returned.
    pub fn generate_traps_with(
        &mut self,
        doc: &Document,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<TrapRun, TrapError> {
        doc.validate()?;

        if !self.settings.mode.enabled {
            let run = TrapRun {
                layer: empty_layer(&self.settings),
                graph: AdjacencyGraph::default(),
                warnings: Vec::new(),
            };
            self.last = Some(run.clone());
            return Ok(run);
        }

        let started = std::time::Instant::now();
        let mut ctx = RunContext::new(sink, cancel);

        let graph = build_graph(doc, &self.adjacency, &mut ctx)
            .ok_or(TrapError::Cancelled)?;

        let decision_ctx = DecisionContext {
            document: doc,
            graph: &graph,
            settings: &self.settings,
            tags: &self.tags,
        };
        let pairs = graph.pairs();
        let mut decisions: Vec<TrapDecision> = Vec::with_capacity(pairs.len());
        let mut warnings: Vec<Warning> = Vec::new();
        for (i, (a, b)) in pairs.iter().enumerate() {
            if !ctx.step(TrapPhase::Decide, i, pairs.len(), &a.0) {
                return Err(TrapError::Cancelled);
            }
            if let Some(decision) = decision_ctx.decide(a, b) {
                warnings.extend(decision.warnings.iter().cloned());
                decisions.push(decision);
            }
        }

        let mut layer = generate_layer(
            doc,
            &graph,
            &decisions,
            &self.settings,
            &mut warnings,
            &mut ctx,
        )
        .ok_or(TrapError::Cancelled)?;
        layer.duration = started.elapsed();

        log::info!(
            "trapped {} region pair(s) into {} trap(s) in {:?}",
            pairs.len(),
            layer.traps.len(),
            layer.duration
        );

        let run = TrapRun {
            layer,
            graph,
            warnings,
        };
        self.last = Some(run.clone());
        Ok(run)
    }

    /// Runs the QC checks against the last generated trap layer, using the
    /// settings snapshot embedded in that layer.
    pub fn run_qc(&self, doc: &Document) -> Result<QcReport, TrapError> {
        let run = self.last.as_ref().ok_or(TrapError::NoTrapLayer)?;
        Ok(run_qc(doc, &run.graph, &run.layer, &run.layer.settings))
    }
}

fn empty_layer(settings: &TrapSettings) -> TrapLayer {
    TrapLayer {
        traps: Vec::new(),
        stats: TrapStats::default(),
        settings: settings.clone(),
        generated_at: OffsetDateTime::now_utc(),
        duration: std::time::Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Cmyk, Ink};
    use crate::document::Layer;
    use crate::geometry::BezierPath;
    use crate::GraphicObject;

    fn doc() -> Document {
        Document::new(
            vec![
                GraphicObject::filled_path("a", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), "Light"),
                GraphicObject::filled_path("b", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), "Dark"),
            ],
            vec![Layer::new("art", "Artwork")],
            vec![
                Ink::process("Light", Cmyk::from_percent(20.0, 20.0, 20.0, 0.0)),
                Ink::process("Dark", Cmyk::from_percent(0.0, 0.0, 0.0, 80.0)),
            ],
        )
    }

    #[test]
    fn pipeline_produces_one_trap_for_the_pair() {
        let mut session = TrapSession::new(TrapSettings::default());
        let run = session.generate_traps(&doc()).unwrap();
        assert_eq!(run.layer.traps.len(), 1);
        assert_eq!(run.graph.region_count(), 2);
        assert!(run.warnings.is_empty());
    }

    #[test]
    fn two_runs_are_deterministic() {
        let mut session = TrapSession::new(TrapSettings::default());
        let d = doc();
        let run1 = session.generate_traps(&d).unwrap();
        let run2 = session.generate_traps(&d).unwrap();
        assert_eq!(run1.layer.traps.len(), run2.layer.traps.len());
        for (a, b) in run1.layer.traps.iter().zip(run2.layer.traps.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.contour, b.contour);
            assert_eq!(a.cmyk, b.cmyk);
        }
        assert_eq!(run1.warnings, run2.warnings);
    }

    #[test]
    fn invalid_document_is_a_fatal_error() {
        let mut session = TrapSession::new(TrapSettings::default());
        let empty = Document::default();
        assert!(matches!(
            session.generate_traps(&empty),
            Err(TrapError::Document(_))
        ));
    }

    #[test]
    fn cancellation_returns_the_sentinel() {
        let mut session = TrapSession::new(TrapSettings::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = NullProgress;
        assert_eq!(
            session.generate_traps_with(&doc(), &mut sink, &cancel),
            Err(TrapError::Cancelled)
        );
        // no partial result is retained
        assert!(session.run_qc(&doc()).is_err());
    }

    #[test]
    fn progress_covers_every_phase() {
        struct Collector(Vec<TrapPhase>);
        impl ProgressSink for Collector {
            fn update(&mut self, progress: &ProgressUpdate) {
                self.0.push(progress.phase);
            }
        }

        let mut session = TrapSession::new(TrapSettings::default());
        let cancel = CancelToken::new();
        let mut sink = Collector(Vec::new());
        session
            .generate_traps_with(&doc(), &mut sink, &cancel)
            .unwrap();
        assert!(sink.0.contains(&TrapPhase::Analyze));
        assert!(sink.0.contains(&TrapPhase::Decide));
        assert!(sink.0.contains(&TrapPhase::Generate));
    }

    #[test]
    fn master_switch_produces_an_empty_layer() {
        let mut settings = TrapSettings::default();
        settings.mode.enabled = false;
        let mut session = TrapSession::new(settings);
        let run = session.generate_traps(&doc()).unwrap();
        assert!(run.layer.is_empty());
        assert_eq!(run.graph.region_count(), 0);
    }

    #[test]
    fn update_settings_merges_partial_patches() {
        let mut session = TrapSession::new(TrapSettings::default());
        session
            .update_settings(&serde_json::json!({
                "distance": { "default-width": 0.3 }
            }))
            .unwrap();
        assert_eq!(session.settings().distance.default_width.0, 0.3);
        // idempotent
        session
            .update_settings(&serde_json::json!({
                "distance": { "default-width": 0.3 }
            }))
            .unwrap();
        assert_eq!(session.settings().distance.default_width.0, 0.3);
    }

    #[test]
    fn qc_requires_a_prior_run() {
        let session = TrapSession::new(TrapSettings::default());
        assert_eq!(session.run_qc(&doc()).unwrap_err(), TrapError::NoTrapLayer);
    }

    #[test]
    fn clear_forgets_the_last_result() {
        let mut session = TrapSession::new(TrapSettings::default());
        session.generate_traps(&doc()).unwrap();
        assert!(session.run_qc(&doc()).is_ok());
        session.clear();
        assert_eq!(session.run_qc(&doc()).unwrap_err(), TrapError::NoTrapLayer);
    }
}
