use crate::{
    error::Result,
    pipeline::{PipelineContext, PipelineStage, PipelineState},
    types::{BinaryRaster, LineFeatureCollection, PolygonBoundary, RasterLayer},
};

/// Trait for clip-and-resample algorithms
pub trait RasterClipper: Send + Sync {
    /// Crop `raster` to `boundary` (or keep its extent) and resample to `target_resolution`
    fn clip(
        &self,
        ctx: &PipelineContext,
        raster: &RasterLayer,
        boundary: Option<&PolygonBoundary>,
        target_resolution: f64,
    ) -> Result<RasterLayer>;
}

/// Trait for vegetation-index binarization
pub trait IndexBinarizer: Send + Sync {
    /// Emit 1 where the index exceeds `threshold`, 0 elsewhere
    fn binarize(
        &self,
        ctx: &PipelineContext,
        raster: &RasterLayer,
        threshold: f64,
    ) -> Result<BinaryRaster>;
}

/// Trait for morphological thinning
pub trait Skeletonizer: Send + Sync {
    /// Thin foreground regions to 1-pixel-wide centerlines
    fn thin(
        &self,
        ctx: &PipelineContext,
        raster: &BinaryRaster,
        max_iterations: usize,
    ) -> Result<BinaryRaster>;
}

/// Trait for raster-to-vector tracing
pub trait Vectorizer: Send + Sync {
    /// Trace skeleton pixels into line geometries
    fn trace(&self, ctx: &PipelineContext, skeleton: &BinaryRaster) -> Result<LineFeatureCollection>;
}

/// Trait for line simplification algorithms
pub trait GeometrySimplifier: Send + Sync {
    /// Simplify the lines in place by reducing vertex count
    fn simplify(
        &self,
        ctx: &PipelineContext,
        lines: &mut LineFeatureCollection,
        tolerance: f64,
    ) -> Result<()>;
}

/// Destination of the final line collection
pub trait FeatureSink {
    /// Identifier of the destination, used in error messages
    fn id(&self) -> String;

    /// Take ownership of the final collection
    fn write(&mut self, lines: LineFeatureCollection) -> Result<()>;
}

/// Receives coarse step-level progress
pub trait ProgressObserver: Send + Sync {
    fn on_stage(&self, step: usize, total: usize, stage: PipelineStage);

    fn on_finished(&self, _state: PipelineState) {}
}
