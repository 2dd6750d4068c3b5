//! # Planting-Row Extraction Library
//!
//! Extracts planting-row centerlines from an RGB orthomosaic. A vegetation
//! index is thresholded into a binary raster, thinned to a one-pixel
//! skeleton, traced into lines and simplified.
//!
//! ## Core Features
//!
//! - **Trait-based Stages**: clip, binarize, thin, trace and simplify are each a trait
//! - **Explicit State Machine**: every run walks `Clipping → … → Done | Failed`
//! - **Georeferencing**: world-file rasters in, GeoJSON lines out, CRS carried through
//! - **Cooperative Cancellation**: a shared token checked between stages
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rowline::{Crs, GeoJsonSink, Pipeline, PipelineInput, PolygonBoundary, load_raster};
//!
//! let raster = load_raster("ortomosaico.tif", Crs::new("EPSG:31982"))?;
//! let boundary = PolygonBoundary::from_geojson_file("talhao.geojson")?;
//!
//! let pipeline = Pipeline::builder().build();
//! let report = pipeline.run(
//!     PipelineInput::new(raster).with_boundary(boundary),
//!     &mut GeoJsonSink::new("linhas.geojson"),
//! )?;
//! println!("{} rows traced", report.line_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use rowline::{Pipeline, SimplifyMethod, algorithms::*};
//!
//! let pipeline = Pipeline::builder()
//!     .target_resolution(0.25)
//!     .threshold(0.08)
//!     .set_binarizer(BandMathBinarizer::new(GreenLeafIndex::new(1e-6), Default::default()))
//!     .with_simplification(0.05, SimplifyMethod::Area)
//!     .build();
//! ```

pub mod algorithms;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use config::{BandMapping, PipelineConfig, Resampling, SimplifyMethod};
pub use error::{Result, RowLineError};
pub use io::{GeoJsonSink, MemorySink, load_boundary, load_raster, parse_world_file};
pub use pipeline::{
    CancellationToken, Pipeline, PipelineContext, PipelineInput, PipelineStage, PipelineState,
    RunReport, TracingProgress, builder::PipelineBuilder,
};
pub use traits::*;
pub use types::{
    Band, BinaryRaster, Crs, GeoTransform, GridGeometry, LineFeatureCollection, PolygonBoundary,
    RasterLayer,
};
