use std::fmt;

use geo_types::{Coord, LineString, MultiPolygon, Polygon, Rect};
use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RowLineError};

/// A single raster band of `f32` samples.
pub type Band = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Coordinate reference system identifier such as `EPSG:31982`.
///
/// The pipeline never reprojects; the identifier travels with every
/// artifact so mismatches can be rejected. An empty identifier means
/// "unspecified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub fn new(authid: impl Into<String>) -> Self {
        Self(authid.into().trim().to_string())
    }

    pub fn unspecified() -> Self {
        Self(String::new())
    }

    pub fn is_unspecified(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unspecified() {
            f.write_str("unspecified")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// North-up affine transform from pixel space to ground coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X of the upper-left corner of the upper-left cell
    pub origin_x: f64,
    /// Y of the upper-left corner of the upper-left cell
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Square cells of `cell_size` ground units with the origin at the upper-left corner.
    pub fn north_up(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width: cell_size,
            pixel_height: -cell_size,
        }
    }

    pub fn cell_center(&self, col: u32, row: u32) -> Coord<f64> {
        Coord {
            x: self.origin_x + (f64::from(col) + 0.5) * self.pixel_width,
            y: self.origin_y + (f64::from(row) + 0.5) * self.pixel_height,
        }
    }

    /// Fractional pixel position of a ground coordinate.
    pub fn to_pixel(&self, coord: Coord<f64>) -> (f64, f64) {
        (
            (coord.x - self.origin_x) / self.pixel_width,
            (coord.y - self.origin_y) / self.pixel_height,
        )
    }
}

/// Shared geometry of every band in a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub transform: GeoTransform,
    pub width: u32,
    pub height: u32,
}

impl GridGeometry {
    pub fn new(transform: GeoTransform, width: u32, height: u32) -> Self {
        Self {
            transform,
            width,
            height,
        }
    }

    pub fn cell_center(&self, col: u32, row: u32) -> Coord<f64> {
        self.transform.cell_center(col, row)
    }

    /// The cell containing a ground coordinate, if it lies on the grid.
    pub fn cell_at(&self, coord: Coord<f64>) -> Option<(u32, u32)> {
        let (col, row) = self.transform.to_pixel(coord);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor(), row.floor());
        if col >= f64::from(self.width) || row >= f64::from(self.height) {
            return None;
        }
        Some((col as u32, row as u32))
    }

    /// Ground extent covered by the grid.
    pub fn extent(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            Coord {
                x: t.origin_x,
                y: t.origin_y,
            },
            Coord {
                x: t.origin_x + f64::from(self.width) * t.pixel_width,
                y: t.origin_y + f64::from(self.height) * t.pixel_height,
            },
        )
    }

    /// Absolute cell size as `(x, y)` ground units.
    pub fn cell_size(&self) -> (f64, f64) {
        (
            self.transform.pixel_width.abs(),
            self.transform.pixel_height.abs(),
        )
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Georeferenced multi-band raster.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    grid: GridGeometry,
    crs: Crs,
    nodata: Option<f32>,
    bands: Vec<Band>,
}

impl RasterLayer {
    /// Build a raster, checking that every band matches the grid.
    pub fn new(grid: GridGeometry, crs: Crs, bands: Vec<Band>) -> Result<Self> {
        if bands.is_empty() {
            return Err(RowLineError::InvalidInput(
                "raster must have at least one band".to_string(),
            ));
        }
        for (i, band) in bands.iter().enumerate() {
            if band.dimensions() != (grid.width, grid.height) {
                return Err(RowLineError::InvalidInput(format!(
                    "band {} is {}x{}, grid is {}x{}",
                    i + 1,
                    band.width(),
                    band.height(),
                    grid.width,
                    grid.height
                )));
            }
        }
        let (pw, ph) = (grid.transform.pixel_width, grid.transform.pixel_height);
        if !(pw.is_finite() && ph.is_finite() && pw > 0.0 && ph != 0.0) {
            return Err(RowLineError::InvalidInput(format!(
                "invalid pixel size {pw} x {ph}"
            )));
        }

        Ok(Self {
            grid,
            crs,
            nodata: None,
            bands,
        })
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    pub fn width(&self) -> u32 {
        self.grid.width
    }

    pub fn height(&self) -> u32 {
        self.grid.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Look up a band by its 1-based index.
    pub fn band(&self, index: usize) -> Result<&Band> {
        index
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or(RowLineError::BandCountMismatch {
                requested: index,
                available: self.bands.len(),
            })
    }

    /// True when the sample is the nodata sentinel.
    pub fn is_nodata(&self, value: f32) -> bool {
        self.nodata.is_some_and(|nodata| value == nodata)
    }
}

/// Clip mask made of one or more polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonBoundary {
    polygons: MultiPolygon<f64>,
    crs: Option<Crs>,
}

impl PolygonBoundary {
    pub fn new(polygons: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            polygons: polygons.into(),
            crs: None,
        }
    }

    /// Axis-aligned rectangle as a boundary.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.to_polygon())
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.0.is_empty()
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        use geo::BoundingRect;
        self.polygons.bounding_rect()
    }
}

impl From<Polygon<f64>> for PolygonBoundary {
    fn from(polygon: Polygon<f64>) -> Self {
        Self::new(polygon)
    }
}

/// Single-band raster whose cells are `0` (background) or `1` (foreground).
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryRaster {
    grid: GridGeometry,
    crs: Crs,
    cells: GrayImage,
}

impl BinaryRaster {
    pub const BACKGROUND: u8 = 0;
    pub const FOREGROUND: u8 = 1;

    /// Build a binary raster, rejecting cells outside `{0, 1}`.
    pub fn new(grid: GridGeometry, crs: Crs, cells: GrayImage) -> Result<Self> {
        if cells.dimensions() != (grid.width, grid.height) {
            return Err(RowLineError::InvalidInput(format!(
                "cells are {}x{}, grid is {}x{}",
                cells.width(),
                cells.height(),
                grid.width,
                grid.height
            )));
        }
        let raster = Self { grid, crs, cells };
        raster.validate()?;
        Ok(raster)
    }

    /// All-background raster on the given grid.
    pub fn zeros(grid: GridGeometry, crs: Crs) -> Self {
        Self {
            cells: GrayImage::new(grid.width, grid.height),
            grid,
            crs,
        }
    }

    /// Check the `{0, 1}` invariant.
    pub fn validate(&self) -> Result<()> {
        match self
            .cells
            .enumerate_pixels()
            .find(|(_, _, p)| p[0] > Self::FOREGROUND)
        {
            Some((x, y, p)) => Err(RowLineError::InvalidInput(format!(
                "binary raster holds value {} at ({x}, {y})",
                p[0]
            ))),
            None => Ok(()),
        }
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn cells(&self) -> &GrayImage {
        &self.cells
    }

    pub fn width(&self) -> u32 {
        self.grid.width
    }

    pub fn height(&self) -> u32 {
        self.grid.height
    }

    pub fn is_foreground(&self, col: u32, row: u32) -> bool {
        self.cells.get_pixel(col, row)[0] == Self::FOREGROUND
    }

    pub fn set(&mut self, col: u32, row: u32, foreground: bool) {
        self.cells.put_pixel(col, row, Luma([u8::from(foreground)]));
    }

    pub fn foreground_count(&self) -> usize {
        self.cells
            .pixels()
            .filter(|p| p[0] == Self::FOREGROUND)
            .count()
    }
}

/// Ordered line geometries in a working CRS. Carries no attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFeatureCollection {
    crs: Crs,
    lines: Vec<LineString<f64>>,
}

impl LineFeatureCollection {
    pub fn new(crs: Crs) -> Self {
        Self {
            crs,
            lines: Vec::new(),
        }
    }

    pub fn from_lines(crs: Crs, lines: Vec<LineString<f64>>) -> Self {
        Self { crs, lines }
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn lines(&self) -> &[LineString<f64>] {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut [LineString<f64>] {
        &mut self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of vertices across every line.
    pub fn vertex_count(&self) -> usize {
        self.lines.iter().map(|line| line.0.len()).sum()
    }

    /// Total length in ground units.
    pub fn total_length(&self) -> f64 {
        use geo::EuclideanLength;
        self.lines.iter().map(|line| line.euclidean_length()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: u32, height: u32) -> GridGeometry {
        GridGeometry::new(GeoTransform::north_up(100.0, 50.0, 0.5), width, height)
    }

    #[test]
    fn cell_centers_follow_north_up_transform() {
        let g = grid(4, 2);
        assert_eq!(g.cell_center(0, 0), Coord { x: 100.25, y: 49.75 });
        assert_eq!(g.cell_center(3, 1), Coord { x: 101.75, y: 49.25 });
        assert_eq!(g.cell_at(Coord { x: 101.75, y: 49.25 }), Some((3, 1)));
        assert_eq!(g.cell_at(Coord { x: 99.9, y: 49.25 }), None);
        assert_eq!(g.cell_at(Coord { x: 102.0, y: 49.25 }), None);
    }

    #[test]
    fn extent_is_normalised() {
        let extent = grid(4, 2).extent();
        assert_eq!(extent.min(), Coord { x: 100.0, y: 49.0 });
        assert_eq!(extent.max(), Coord { x: 102.0, y: 50.0 });
    }

    #[test]
    fn raster_rejects_band_with_wrong_dimensions() {
        let bands = vec![Band::new(4, 2), Band::new(3, 2)];
        let err = RasterLayer::new(grid(4, 2), Crs::new("EPSG:31982"), bands).unwrap_err();
        assert!(matches!(err, RowLineError::InvalidInput(_)));
    }

    #[test]
    fn band_lookup_is_one_based() {
        let bands = vec![Band::from_pixel(4, 2, Luma([1.0])), Band::from_pixel(4, 2, Luma([2.0]))];
        let raster = RasterLayer::new(grid(4, 2), Crs::unspecified(), bands).unwrap();
        assert_eq!(raster.band(2).unwrap().get_pixel(0, 0)[0], 2.0);
        assert!(matches!(
            raster.band(0),
            Err(RowLineError::BandCountMismatch { requested: 0, available: 2 })
        ));
        assert!(matches!(
            raster.band(3),
            Err(RowLineError::BandCountMismatch { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn binary_raster_rejects_non_binary_cells() {
        let mut cells = GrayImage::new(4, 2);
        cells.put_pixel(1, 1, Luma([255]));
        let err = BinaryRaster::new(grid(4, 2), Crs::unspecified(), cells).unwrap_err();
        assert!(matches!(err, RowLineError::InvalidInput(_)));
    }

    #[test]
    fn zeros_raster_counts_set_cells() {
        let g = grid(4, 2);
        assert_eq!(g.cell_count(), 8);

        let mut raster = BinaryRaster::zeros(g, Crs::unspecified());
        assert_eq!(raster.foreground_count(), 0);
        raster.set(3, 1, true);
        raster.set(0, 0, true);
        raster.set(0, 0, false);
        assert_eq!(raster.foreground_count(), 1);
        assert!(raster.is_foreground(3, 1));
        assert!(raster.validate().is_ok());
    }

    #[test]
    fn total_length_sums_every_line() {
        let lines = LineFeatureCollection::from_lines(
            Crs::new("EPSG:31982"),
            vec![
                LineString::from(vec![(0.0, 0.0), (3.0, 4.0)]),
                LineString::from(vec![(0.0, 0.0), (0.0, 1.0), (2.0, 1.0)]),
            ],
        );
        assert!((lines.total_length() - 8.0).abs() < 1e-12);
        assert_eq!(lines.vertex_count(), 5);
    }

    #[test]
    fn crs_display_marks_unspecified() {
        assert_eq!(Crs::unspecified().to_string(), "unspecified");
        assert_eq!(Crs::new(" EPSG:4326 ").to_string(), "EPSG:4326");
    }
}
