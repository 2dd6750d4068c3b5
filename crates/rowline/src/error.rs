use geo_types::Rect;
use thiserror::Error;

use crate::{pipeline::PipelineStage, types::Crs};

#[derive(Error, Debug)]
pub enum RowLineError {
    #[error("Invalid boundary geometry: {0}")]
    InvalidGeometry(String),

    #[error("Boundary {boundary:?} does not overlap raster extent {raster:?}")]
    EmptyIntersection { boundary: Rect<f64>, raster: Rect<f64> },

    #[error("Band {requested} is out of range for a raster with {available} band(s)")]
    BandCountMismatch { requested: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tracing failed: {0}")]
    TracingFailed(String),

    #[error("Failed to write to sink '{sink}': {reason}")]
    SinkWrite { sink: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CRS mismatch: expected {expected}, found {found}")]
    CrsMismatch { expected: Crs, found: Crs },

    #[error("Pipeline cancelled before the {0} stage")]
    Cancelled(PipelineStage),

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: Box<RowLineError>,
    },

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl RowLineError {
    /// The stage a pipeline failure is attributed to, if any.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            Self::Cancelled(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Unwraps stage attribution down to the error raised by the kernel.
    pub fn root_cause(&self) -> &RowLineError {
        match self {
            Self::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn in_stage(self, stage: PipelineStage) -> Self {
        match self {
            Self::Cancelled(_) | Self::StageFailed { .. } => self,
            other => Self::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RowLineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_attribution_unwraps_to_kernel_error() {
        let err = RowLineError::BandCountMismatch {
            requested: 3,
            available: 1,
        }
        .in_stage(PipelineStage::Binarizing);

        assert_eq!(err.stage(), Some(PipelineStage::Binarizing));
        assert!(matches!(
            err.root_cause(),
            RowLineError::BandCountMismatch { requested: 3, available: 1 }
        ));
        assert_eq!(
            err.to_string(),
            "binarizing stage failed: Band 3 is out of range for a raster with 1 band(s)"
        );
    }

    #[test]
    fn cancellation_is_not_rewrapped() {
        let err = RowLineError::Cancelled(PipelineStage::Thinning).in_stage(PipelineStage::Thinning);
        assert!(matches!(err, RowLineError::Cancelled(PipelineStage::Thinning)));
    }
}
