use std::sync::Arc;

use crate::{
    algorithms::{
        BandMathBinarizer, CutlineClipper, DouglasPeuckerSimplifier, GreenLeafIndex,
        SkeletonTracer, VisvalingamWhyattSimplifier, ZhangSuenThinner,
    },
    config::{BandMapping, PipelineConfig, Resampling, SimplifyMethod},
    pipeline::{CancellationToken, Pipeline, TracingProgress},
    traits::{
        GeometrySimplifier, IndexBinarizer, ProgressObserver, RasterClipper, Skeletonizer,
        Vectorizer,
    },
};

/// Builder for creating extraction pipelines with a fluent API
pub struct PipelineBuilder {
    config: PipelineConfig,
    clipper: Option<Box<dyn RasterClipper>>,
    binarizer: Option<Box<dyn IndexBinarizer>>,
    skeletonizer: Option<Box<dyn Skeletonizer>>,
    vectorizer: Option<Box<dyn Vectorizer>>,
    simplifier: Option<Box<dyn GeometrySimplifier>>,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancellation: Option<CancellationToken>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder with the canonical parameters
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            clipper: None,
            binarizer: None,
            skeletonizer: None,
            vectorizer: None,
            simplifier: None,
            observer: None,
            cancellation: None,
        }
    }

    /// Replace every parameter at once
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn target_resolution(mut self, resolution: f64) -> Self {
        self.config.target_resolution = resolution;
        self
    }

    pub fn resampling(mut self, resampling: Resampling) -> Self {
        self.config.resampling = resampling;
        self
    }

    pub fn band_mapping(mut self, bands: BandMapping) -> Self {
        self.config.band_mapping = bands;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    pub fn thin_iterations(mut self, iterations: usize) -> Self {
        self.config.thin_iterations = iterations;
        self
    }

    /// Set the simplification tolerance and algorithm
    pub fn with_simplification(mut self, tolerance: f64, method: SimplifyMethod) -> Self {
        self.config.simplify_tolerance = tolerance;
        self.config.simplify_method = method;
        self
    }

    /// Set the clipper (replaces the default cutline clipper)
    pub fn set_clipper<C>(mut self, clipper: C) -> Self
    where
        C: RasterClipper + 'static,
    {
        self.clipper = Some(Box::new(clipper));
        self
    }

    /// Set the binarizer (replaces the default Green Leaf Index binarizer)
    pub fn set_binarizer<B>(mut self, binarizer: B) -> Self
    where
        B: IndexBinarizer + 'static,
    {
        self.binarizer = Some(Box::new(binarizer));
        self
    }

    pub fn set_skeletonizer<S>(mut self, skeletonizer: S) -> Self
    where
        S: Skeletonizer + 'static,
    {
        self.skeletonizer = Some(Box::new(skeletonizer));
        self
    }

    pub fn set_vectorizer<V>(mut self, vectorizer: V) -> Self
    where
        V: Vectorizer + 'static,
    {
        self.vectorizer = Some(Box::new(vectorizer));
        self
    }

    /// Set the simplifier (replaces the one chosen by `simplify_method`)
    pub fn set_simplifier<S>(mut self, simplifier: S) -> Self
    where
        S: GeometrySimplifier + 'static,
    {
        self.simplifier = Some(Box::new(simplifier));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Build the pipeline with default components if not specified
    pub fn build(self) -> Pipeline {
        let config = self.config;

        let clipper = self.clipper.unwrap_or_else(|| {
            Box::new(CutlineClipper {
                resampling: config.resampling,
                nodata: config.nodata,
            })
        });

        let binarizer = self.binarizer.unwrap_or_else(|| {
            Box::new(BandMathBinarizer::new(
                GreenLeafIndex::new(config.index_epsilon),
                config.band_mapping,
            ))
        });

        let skeletonizer = self
            .skeletonizer
            .unwrap_or_else(|| Box::new(ZhangSuenThinner));

        let vectorizer = self
            .vectorizer
            .unwrap_or_else(|| Box::new(SkeletonTracer::default()));

        let simplifier = self.simplifier.unwrap_or_else(|| match config.simplify_method {
            SimplifyMethod::Distance => Box::new(DouglasPeuckerSimplifier),
            SimplifyMethod::Area => Box::new(VisvalingamWhyattSimplifier),
        });

        Pipeline::new(
            config,
            clipper,
            binarizer,
            skeletonizer,
            vectorizer,
            simplifier,
            self.observer.unwrap_or_else(|| Arc::new(TracingProgress)),
            self.cancellation.unwrap_or_default(),
        )
    }

    /// Build the canonical pipeline (0.4 resolution, GLI > 0.06, 100 iterations, 0.5 tolerance)
    pub fn build_canonical() -> Pipeline {
        Self::new().build()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_override_canonical_parameters() {
        let pipeline = PipelineBuilder::new()
            .target_resolution(0.25)
            .threshold(0.1)
            .thin_iterations(10)
            .with_simplification(2.0, SimplifyMethod::Area)
            .build();

        let config = pipeline.config();
        assert_eq!(config.target_resolution, 0.25);
        assert_eq!(config.threshold, 0.1);
        assert_eq!(config.thin_iterations, 10);
        assert_eq!(config.simplify_method, SimplifyMethod::Area);
        assert!(pipeline.info().contains("area simplification at 2"));
    }

    #[test]
    fn canonical_pipeline_uses_default_config() {
        let pipeline = PipelineBuilder::build_canonical();
        let config = pipeline.config();
        assert_eq!(config.target_resolution, 0.4);
        assert_eq!(config.threshold, 0.06);
        assert_eq!(config.thin_iterations, 100);
        assert_eq!(config.simplify_tolerance, 0.5);
        assert_eq!(config.simplify_method, SimplifyMethod::Distance);
        assert!(!pipeline.cancellation().is_cancelled());
    }

    #[test]
    fn shared_token_cancels_built_pipeline() {
        let token = CancellationToken::new();
        let pipeline = PipelineBuilder::new().with_cancellation(token.clone()).build();
        token.cancel();
        assert!(pipeline.cancellation().is_cancelled());
    }
}
