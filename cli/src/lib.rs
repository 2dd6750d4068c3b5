use rowline::{
    CancellationToken, Crs, GeoJsonSink, Pipeline, PipelineConfig, PipelineInput, RowLineError,
    RunReport, load_boundary, load_raster,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Pipeline(#[from] RowLineError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One extraction job: where the orthomosaic is, how to clip it, where the lines go
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RowJob {
    /// Orthomosaic to process (georeferenced by its world file)
    pub input_raster: PathBuf,
    /// Optional GeoJSON polygon the raster is clipped to
    #[serde(default, alias = "area_contorno", skip_serializing_if = "Option::is_none")]
    pub boundary: Option<PathBuf>,
    /// GeoJSON file receiving the row centerlines
    pub output: PathBuf,
    /// CRS identifier of the raster, e.g. `EPSG:31982`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl RowJob {
    /// Job with the canonical pipeline parameters
    pub fn new(input_raster: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input_raster: input_raster.into(),
            boundary: None,
            output: output.into(),
            crs: None,
            pipeline: PipelineConfig::default(),
        }
    }

    /// Get the JSON schema for job files
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RowJob)
    }

    /// Load job from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load job from TOML string
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    /// Load job from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load job from JSON string
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load the job
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    /// Save job to a file, format chosen by extension
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        let path_ref = path.as_ref();
        let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            _ => return Err(CliError::UnsupportedFileFormat),
        };
        fs::write(path_ref, content)?;
        Ok(())
    }

    /// Convert job to TOML string
    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Convert job to JSON string
    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Load inputs, run the pipeline and write the GeoJSON output.
    pub fn execute(&self, cancellation: CancellationToken) -> Result<RunReport, CliError> {
        let crs = self.crs.as_deref().map(Crs::new).unwrap_or_default();
        let raster = load_raster(&self.input_raster, crs)?;
        let boundary = self.boundary.as_ref().map(load_boundary).transpose()?;

        let pipeline = Pipeline::builder()
            .with_config(self.pipeline.clone())
            .with_cancellation(cancellation)
            .build();
        info!("{}", pipeline.info());

        let mut sink = GeoJsonSink::new(&self.output);
        let report = pipeline.run(PipelineInput { raster, boundary }, &mut sink)?;
        Ok(report)
    }
}
