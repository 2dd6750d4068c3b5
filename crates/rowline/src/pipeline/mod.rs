pub mod builder;
mod context;
mod state;

pub use context::{CancellationToken, PipelineContext, TracingProgress};
pub use state::{PipelineStage, PipelineState, StageOutcome};

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::{
    config::PipelineConfig,
    error::{Result, RowLineError},
    io::MemorySink,
    traits::{
        FeatureSink, GeometrySimplifier, IndexBinarizer, ProgressObserver, RasterClipper,
        Skeletonizer, Vectorizer,
    },
    types::{BinaryRaster, Crs, LineFeatureCollection, PolygonBoundary, RasterLayer},
};

/// Caller-supplied inputs of a run
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub raster: RasterLayer,
    pub boundary: Option<PolygonBoundary>,
}

impl PipelineInput {
    pub fn new(raster: RasterLayer) -> Self {
        Self {
            raster,
            boundary: None,
        }
    }

    pub fn with_boundary(mut self, boundary: PolygonBoundary) -> Self {
        self.boundary = Some(boundary);
        self
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub state: PipelineState,
    pub steps_completed: usize,
    pub line_count: usize,
    pub vertex_count: usize,
    pub simplified: bool,
    pub crs: Crs,
}

/// Intermediate product owned by the orchestrator between two stages
#[derive(Debug)]
enum Artifact {
    Source(RasterLayer),
    Clipped(RasterLayer),
    Binary(BinaryRaster),
    Skeleton(BinaryRaster),
    Lines(LineFeatureCollection),
}

impl Artifact {
    fn kind(&self) -> &'static str {
        match self {
            Self::Source(_) => "source raster",
            Self::Clipped(_) => "clipped raster",
            Self::Binary(_) => "binary raster",
            Self::Skeleton(_) => "skeleton raster",
            Self::Lines(_) => "line collection",
        }
    }
}

/// Row extraction pipeline: clip, binarize, thin, trace, simplify
pub struct Pipeline {
    config: PipelineConfig,
    clipper: Box<dyn RasterClipper>,
    binarizer: Box<dyn IndexBinarizer>,
    skeletonizer: Box<dyn Skeletonizer>,
    vectorizer: Box<dyn Vectorizer>,
    simplifier: Box<dyn GeometrySimplifier>,
    observer: Arc<dyn ProgressObserver>,
    cancellation: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    /// Create a new pipeline with the given components
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        clipper: Box<dyn RasterClipper>,
        binarizer: Box<dyn IndexBinarizer>,
        skeletonizer: Box<dyn Skeletonizer>,
        vectorizer: Box<dyn Vectorizer>,
        simplifier: Box<dyn GeometrySimplifier>,
        observer: Arc<dyn ProgressObserver>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            config,
            clipper,
            binarizer,
            skeletonizer,
            vectorizer,
            simplifier,
            observer,
            cancellation,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that aborts the run before its next stage
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Run every stage and hand the result to `sink`.
    ///
    /// Any stage error aborts the run; nothing is written to the sink in that case.
    pub fn run(&self, input: PipelineInput, sink: &mut dyn FeatureSink) -> Result<RunReport> {
        self.config.validate()?;

        let PipelineInput { raster, boundary } = input;
        let crs = raster.crs().clone();
        if let Some(found) = boundary.as_ref().and_then(PolygonBoundary::crs) {
            if !found.is_unspecified() && !crs.is_unspecified() && *found != crs {
                return Err(RowLineError::CrsMismatch {
                    expected: crs,
                    found: found.clone(),
                });
            }
        }

        let _span = info_span!("row_extraction", crs = %crs, sink = %sink.id()).entered();
        let mut ctx = PipelineContext::new(crs, self.cancellation.clone(), Arc::clone(&self.observer));
        let mut state = PipelineState::start();
        let mut artifact = Artifact::Source(raster);
        let mut simplified = false;
        let mut last_stage = PipelineStage::Clipping;

        while let PipelineState::Running(stage) = state {
            last_stage = stage;
            match self.execute(stage, &mut ctx, artifact, boundary.as_ref()) {
                Ok((next, outcome)) => {
                    simplified |= stage == PipelineStage::Simplifying;
                    if outcome == StageOutcome::TracedEmpty {
                        info!("Tracing produced no lines, skipping simplification");
                    }
                    artifact = next;
                    state = state.advance(outcome);
                }
                Err(err) => {
                    state = state.fail();
                    ctx.finish(state);
                    return Err(err.in_stage(stage));
                }
            }
        }

        let lines = match artifact {
            Artifact::Lines(lines) => lines,
            other => {
                return Err(RowLineError::InvalidInput(format!(
                    "pipeline finished holding a {} instead of lines",
                    other.kind()
                )));
            }
        };

        let report = RunReport {
            state,
            steps_completed: ctx.step(),
            line_count: lines.len(),
            vertex_count: lines.vertex_count(),
            simplified,
            crs: lines.crs().clone(),
        };

        let sink_id = sink.id();
        if let Err(err) = sink.write(lines) {
            // A failed write is charged to the last stage that ran.
            ctx.finish(PipelineState::Failed(last_stage));
            return Err(match err {
                RowLineError::SinkWrite { .. } => err,
                other => RowLineError::SinkWrite {
                    sink: sink_id,
                    reason: other.to_string(),
                },
            });
        }

        ctx.finish(state);
        info!(
            lines = report.line_count,
            vertices = report.vertex_count,
            sink = %sink_id,
            "Row lines written"
        );
        Ok(report)
    }

    /// Run the pipeline and return the lines instead of writing them to a sink.
    pub fn process(&self, input: PipelineInput) -> Result<LineFeatureCollection> {
        let mut sink = MemorySink::new();
        self.run(input, &mut sink)?;
        sink.take().ok_or_else(|| RowLineError::SinkWrite {
            sink: "memory".to_string(),
            reason: "pipeline finished without writing".to_string(),
        })
    }

    /// Run one stage on the artifact left by the previous one.
    fn execute(
        &self,
        stage: PipelineStage,
        ctx: &mut PipelineContext,
        artifact: Artifact,
        boundary: Option<&PolygonBoundary>,
    ) -> Result<(Artifact, StageOutcome)> {
        ctx.enter(stage)?;
        let ctx = &*ctx;
        let config = &self.config;

        match (stage, artifact) {
            (PipelineStage::Clipping, Artifact::Source(raster)) => {
                let clipped = self
                    .clipper
                    .clip(ctx, &raster, boundary, config.target_resolution)?;
                debug!(
                    width = clipped.width(),
                    height = clipped.height(),
                    cells = clipped.grid().cell_count(),
                    bands = clipped.band_count(),
                    "Clipped raster"
                );
                Ok((Artifact::Clipped(clipped), StageOutcome::Completed))
            }
            (PipelineStage::Binarizing, Artifact::Clipped(raster)) => {
                let binary = self.binarizer.binarize(ctx, &raster, config.threshold)?;
                debug!(foreground = binary.foreground_count(), "Binarized raster");
                Ok((Artifact::Binary(binary), StageOutcome::Completed))
            }
            (PipelineStage::Thinning, Artifact::Binary(binary)) => {
                let skeleton = self
                    .skeletonizer
                    .thin(ctx, &binary, config.thin_iterations)?;
                debug!(foreground = skeleton.foreground_count(), "Thinned raster");
                Ok((Artifact::Skeleton(skeleton), StageOutcome::Completed))
            }
            (PipelineStage::Vectorizing, Artifact::Skeleton(skeleton)) => {
                let lines = self.vectorizer.trace(ctx, &skeleton)?;
                debug!(lines = lines.len(), vertices = lines.vertex_count(), "Traced skeleton");
                let outcome = if lines.is_empty() {
                    StageOutcome::TracedEmpty
                } else {
                    StageOutcome::Completed
                };
                Ok((Artifact::Lines(lines), outcome))
            }
            (PipelineStage::Simplifying, Artifact::Lines(mut lines)) => {
                let before = lines.vertex_count();
                self.simplifier
                    .simplify(ctx, &mut lines, config.simplify_tolerance)?;
                debug!(
                    before,
                    after = lines.vertex_count(),
                    length = lines.total_length(),
                    "Simplified lines"
                );
                Ok((Artifact::Lines(lines), StageOutcome::Completed))
            }
            (stage, other) => Err(RowLineError::InvalidInput(format!(
                "{stage} stage cannot consume a {}",
                other.kind()
            ))),
        }
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "Pipeline: resolution {}, threshold {}, {} thinning iterations, {} simplification at {}",
            self.config.target_resolution,
            self.config.threshold,
            self.config.thin_iterations,
            self.config.simplify_method,
            self.config.simplify_tolerance
        )
    }
}
