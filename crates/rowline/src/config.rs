use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{Result, RowLineError};

pub const DEFAULT_TARGET_RESOLUTION: f64 = 0.4;
pub const DEFAULT_NODATA: f32 = 0.0;
pub const DEFAULT_INDEX_EPSILON: f64 = 0.0001;
pub const DEFAULT_THRESHOLD: f64 = 0.06;
pub const DEFAULT_THIN_ITERATIONS: usize = 100;
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.5;

/// How source cells are combined into a resampled cell
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resampling {
    /// Value of the source cell under the target cell centre
    #[default]
    Nearest,
    /// Mean of the source cells whose centres fall inside the target cell
    Average,
}

/// Line simplification algorithm
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SimplifyMethod {
    /// Douglas-Peucker, tolerance is a distance
    #[default]
    Distance,
    /// Visvalingam-Whyatt, tolerance is an area
    Area,
}

/// 1-based band indices of the colour channels in the input raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BandMapping {
    #[schemars(range(min = 1))]
    pub green: usize,
    #[schemars(range(min = 1))]
    pub red: usize,
    #[schemars(range(min = 1))]
    pub blue: usize,
}

impl Default for BandMapping {
    fn default() -> Self {
        Self {
            green: 2,
            red: 1,
            blue: 3,
        }
    }
}

impl BandMapping {
    /// Highest band index the mapping references.
    pub fn max_band(&self) -> usize {
        self.green.max(self.red).max(self.blue)
    }
}

/// Parameters of the row extraction pipeline.
///
/// Every field has a default, so partial job files only override what they name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Parameters of the planting-row extraction pipeline")]
pub struct PipelineConfig {
    #[schemars(description = "Ground size of a resampled cell, in CRS linear units")]
    pub target_resolution: f64,
    #[schemars(description = "Value written to cells outside the cutline or the source raster")]
    pub nodata: f32,
    pub resampling: Resampling,
    pub band_mapping: BandMapping,
    #[schemars(description = "Added to the Green Leaf Index denominator")]
    pub index_epsilon: f64,
    #[schemars(description = "Cells with an index strictly above this value are vegetation")]
    pub threshold: f64,
    #[schemars(description = "Upper bound on thinning iterations")]
    pub thin_iterations: usize,
    #[schemars(description = "Simplification tolerance (distance or area, depending on the method)")]
    pub simplify_tolerance: f64,
    pub simplify_method: SimplifyMethod,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_resolution: DEFAULT_TARGET_RESOLUTION,
            nodata: DEFAULT_NODATA,
            resampling: Resampling::default(),
            band_mapping: BandMapping::default(),
            index_epsilon: DEFAULT_INDEX_EPSILON,
            threshold: DEFAULT_THRESHOLD,
            thin_iterations: DEFAULT_THIN_ITERATIONS,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            simplify_method: SimplifyMethod::default(),
        }
    }
}

impl PipelineConfig {
    /// Get the JSON schema for the configuration
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.target_resolution.is_finite() && self.target_resolution > 0.0) {
            return Err(RowLineError::InvalidConfig(format!(
                "target_resolution must be a positive number, got {}",
                self.target_resolution
            )));
        }
        if !self.nodata.is_finite() {
            return Err(RowLineError::InvalidConfig("nodata must be finite".to_string()));
        }
        let BandMapping { green, red, blue } = self.band_mapping;
        if green == 0 || red == 0 || blue == 0 {
            return Err(RowLineError::InvalidConfig(
                "band indices are 1-based".to_string(),
            ));
        }
        if !(self.index_epsilon.is_finite() && self.index_epsilon >= 0.0) {
            return Err(RowLineError::InvalidConfig(format!(
                "index_epsilon must be finite and non-negative, got {}",
                self.index_epsilon
            )));
        }
        if !self.threshold.is_finite() {
            return Err(RowLineError::InvalidConfig("threshold must be finite".to_string()));
        }
        if !(self.simplify_tolerance.is_finite() && self.simplify_tolerance >= 0.0) {
            return Err(RowLineError::InvalidConfig(format!(
                "simplify_tolerance must be finite and non-negative, got {}",
                self.simplify_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_canonical_parameters() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_resolution, 0.4);
        assert_eq!(config.nodata, 0.0);
        assert_eq!(config.band_mapping, BandMapping { green: 2, red: 1, blue: 3 });
        assert_eq!(config.threshold, 0.06);
        assert_eq!(config.thin_iterations, 100);
        assert_eq!(config.simplify_tolerance, 0.5);
        assert_eq!(config.simplify_method, SimplifyMethod::Distance);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "threshold": 0.1, "simplify_method": "area" }"#).unwrap();
        assert_eq!(config.threshold, 0.1);
        assert_eq!(config.simplify_method, SimplifyMethod::Area);
        assert_eq!(config.target_resolution, DEFAULT_TARGET_RESOLUTION);
    }

    #[test]
    fn rejects_non_positive_resolution() {
        let config = PipelineConfig {
            target_resolution: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RowLineError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_band_index() {
        let config = PipelineConfig {
            band_mapping: BandMapping { green: 0, red: 1, blue: 3 },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RowLineError::InvalidConfig(_))));
    }

    #[test]
    fn enum_names_are_snake_case() {
        assert_eq!(Resampling::Average.to_string(), "average");
        assert_eq!("distance".parse::<SimplifyMethod>().unwrap(), SimplifyMethod::Distance);
        assert_eq!(<SimplifyMethod as VariantNames>::VARIANTS, &["distance", "area"]);
    }

    #[test]
    fn schema_lists_every_parameter() {
        let schema = serde_json::to_value(PipelineConfig::schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for key in ["target_resolution", "band_mapping", "threshold", "thin_iterations", "simplify_tolerance"] {
            assert!(properties.contains_key(key), "missing {key}");
        }
    }
}
