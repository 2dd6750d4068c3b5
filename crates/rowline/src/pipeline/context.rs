use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::info;

use crate::{
    error::{Result, RowLineError},
    pipeline::{PipelineStage, PipelineState},
    traits::ProgressObserver,
    types::Crs,
};

/// Cooperative abort signal, checked between stages only.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Progress observer that reports through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_stage(&self, step: usize, total: usize, stage: PipelineStage) {
        info!(step, total, %stage, "Entering stage");
    }

    fn on_finished(&self, state: PipelineState) {
        info!(?state, "Pipeline finished");
    }
}

/// Run-scoped state handed to every stage.
pub struct PipelineContext {
    crs: Crs,
    step: usize,
    cancellation: CancellationToken,
    observer: Arc<dyn ProgressObserver>,
}

impl PipelineContext {
    pub fn new(crs: Crs, cancellation: CancellationToken, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            crs,
            step: 0,
            cancellation,
            observer,
        }
    }

    /// Context for calling a stage on its own, outside a pipeline run.
    pub fn detached(crs: Crs) -> Self {
        Self::new(crs, CancellationToken::new(), Arc::new(TracingProgress))
    }

    /// Working CRS every stage stamps on its output
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Last step entered, 0 before the first stage
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Check for cancellation, then advance the step counter to `stage`.
    pub(crate) fn enter(&mut self, stage: PipelineStage) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(RowLineError::Cancelled(stage));
        }
        debug_assert!(stage.step() > self.step, "stages must advance monotonically");
        self.step = stage.step();
        self.observer.on_stage(self.step, PipelineStage::COUNT, stage);
        Ok(())
    }

    pub(crate) fn finish(&self, state: PipelineState) {
        self.observer.on_finished(state);
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("crs", &self.crs)
            .field("step", &self.step)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
