use std::path::{Path, PathBuf};

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde_json::{Map, json};
use tracing::info;

use crate::{
    error::{Result, RowLineError},
    traits::FeatureSink,
    types::{Crs, LineFeatureCollection, PolygonBoundary},
};

fn position_to_coord(position: &[f64]) -> Result<Coord<f64>> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(RowLineError::InvalidGeometry(format!(
            "position has {} ordinates, at least 2 are required",
            position.len()
        ))),
    }
}

fn ring_to_linestring(ring: &[Vec<f64>]) -> Result<LineString<f64>> {
    ring.iter()
        .map(|position| position_to_coord(position))
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let (exterior, holes) = rings
        .split_first()
        .ok_or_else(|| RowLineError::InvalidGeometry("polygon has no rings".to_string()))?;

    let interiors = holes
        .iter()
        .map(|hole| ring_to_linestring(hole))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring_to_linestring(exterior)?, interiors))
}

fn collect_polygons(geometry: &Geometry, polygons: &mut Vec<Polygon<f64>>) -> Result<()> {
    match &geometry.value {
        Value::Polygon(rings) => polygons.push(polygon_from_rings(rings)?),
        Value::MultiPolygon(parts) => {
            for rings in parts {
                polygons.push(polygon_from_rings(rings)?);
            }
        }
        Value::GeometryCollection(members) => {
            for member in members {
                collect_polygons(member, polygons)?;
            }
        }
        other => {
            return Err(RowLineError::InvalidGeometry(format!(
                "boundary must be polygonal, found {}",
                geometry_kind(other)
            )));
        }
    }
    Ok(())
}

fn geometry_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Reads the legacy `crs` member (`{"type": "name", "properties": {"name": ...}}`).
fn named_crs(members: Option<&Map<String, serde_json::Value>>) -> Option<Crs> {
    members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(Crs::new)
}

impl PolygonBoundary {
    /// Parse a boundary from a GeoJSON geometry, feature or feature collection.
    ///
    /// Every polygonal geometry becomes part of the cutline; any other
    /// geometry type is rejected.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let geojson: GeoJson = text.parse()?;
        let mut polygons = Vec::new();

        let crs = match &geojson {
            GeoJson::Geometry(geometry) => {
                collect_polygons(geometry, &mut polygons)?;
                named_crs(geometry.foreign_members.as_ref())
            }
            GeoJson::Feature(feature) => {
                if let Some(geometry) = &feature.geometry {
                    collect_polygons(geometry, &mut polygons)?;
                }
                named_crs(feature.foreign_members.as_ref())
            }
            GeoJson::FeatureCollection(collection) => {
                for geometry in collection.features.iter().filter_map(|f| f.geometry.as_ref()) {
                    collect_polygons(geometry, &mut polygons)?;
                }
                named_crs(collection.foreign_members.as_ref())
            }
        };

        if polygons.is_empty() {
            return Err(RowLineError::InvalidGeometry(
                "GeoJSON holds no polygons".to_string(),
            ));
        }

        let boundary = Self::new(MultiPolygon::new(polygons));
        Ok(match crs {
            Some(crs) => boundary.with_crs(crs),
            None => boundary,
        })
    }

    /// Load a boundary from a GeoJSON file
    pub fn from_geojson_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&text)
    }
}

/// Load a clip boundary from a GeoJSON file
pub fn load_boundary(path: impl AsRef<Path>) -> Result<PolygonBoundary> {
    let path = path.as_ref();
    let boundary = PolygonBoundary::from_geojson_file(path)?;
    info!(
        path = %path.display(),
        polygons = boundary.polygons().0.len(),
        crs = ?boundary.crs(),
        "Loaded boundary"
    );
    Ok(boundary)
}

impl LineFeatureCollection {
    /// Export as a GeoJSON feature collection of LineStrings with no properties
    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .lines()
            .iter()
            .enumerate()
            .map(|(i, line)| Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::LineString(
                    line.coords().map(|c| vec![c.x, c.y]).collect(),
                ))),
                id: Some(geojson::feature::Id::Number(serde_json::Number::from(i))),
                properties: None,
                foreign_members: None,
            })
            .collect();

        let foreign_members = (!self.crs().is_unspecified()).then(|| {
            let mut members = Map::new();
            members.insert(
                "crs".to_string(),
                json!({ "type": "name", "properties": { "name": self.crs().as_str() } }),
            );
            members
        });

        FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        }
    }

    /// Export to GeoJSON and serialize to JSON string
    pub fn to_geojson_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_geojson())?)
    }

    /// Read lines back from a GeoJSON feature collection written by [`Self::to_geojson`].
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let collection: FeatureCollection = text.parse()?;
        let crs = named_crs(collection.foreign_members.as_ref()).unwrap_or_default();

        let lines = collection
            .features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref())
            .map(|geometry| match &geometry.value {
                Value::LineString(positions) => ring_to_linestring(positions),
                other => Err(RowLineError::InvalidInput(format!(
                    "expected LineString features, found {}",
                    geometry_kind(other)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_lines(crs, lines))
    }
}

/// Writes the final lines to a GeoJSON file
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    path: PathBuf,
}

impl GeoJsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureSink for GeoJsonSink {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn write(&mut self, lines: LineFeatureCollection) -> Result<()> {
        let sink_write = |reason: String| RowLineError::SinkWrite {
            sink: self.id(),
            reason,
        };

        let text = lines.to_geojson_string()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| sink_write(err.to_string()))?;
        }
        std::fs::write(&self.path, text).map_err(|err| sink_write(err.to_string()))?;

        info!(path = %self.path.display(), lines = lines.len(), "Saved GeoJSON");
        Ok(())
    }
}
