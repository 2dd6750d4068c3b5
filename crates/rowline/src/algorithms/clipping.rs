use geo::{
    Area, Contains,
    algorithm::line_intersection::{LineIntersection, line_intersection},
};
use geo_types::{Coord, Line, LineString, Point, Rect};
use image::Luma;
use tracing::debug;

use crate::{
    config::{DEFAULT_NODATA, Resampling},
    error::{Result, RowLineError},
    pipeline::PipelineContext,
    traits::RasterClipper,
    types::{Band, GeoTransform, GridGeometry, PolygonBoundary, RasterLayer},
};

/// Crop-to-cutline clipper with resampling to a target ground resolution.
///
/// Output cells whose centre falls outside the cutline, outside the source
/// raster, or on source nodata receive `nodata`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutlineClipper {
    pub resampling: Resampling,
    pub nodata: f32,
}

impl CutlineClipper {
    pub fn new(resampling: Resampling, nodata: f32) -> Self {
        Self { resampling, nodata }
    }

    /// Samples of every band for the target cell, `None` when nothing valid lies under it.
    fn sample(&self, raster: &RasterLayer, target: &GridGeometry, col: u32, row: u32) -> Option<Vec<f32>> {
        match self.resampling {
            Resampling::Nearest => nearest(raster, target.cell_center(col, row)),
            Resampling::Average => {
                average(raster, target, col, row).or_else(|| nearest(raster, target.cell_center(col, row)))
            }
        }
    }
}

impl Default for CutlineClipper {
    fn default() -> Self {
        Self::new(Resampling::default(), DEFAULT_NODATA)
    }
}

fn samples_at(raster: &RasterLayer, col: u32, row: u32) -> Option<Vec<f32>> {
    let values: Vec<f32> = raster
        .bands()
        .iter()
        .map(|band| band.get_pixel(col, row)[0])
        .collect();
    if values.iter().all(|&v| raster.is_nodata(v)) {
        None
    } else {
        Some(values)
    }
}

fn nearest(raster: &RasterLayer, center: Coord<f64>) -> Option<Vec<f32>> {
    let (col, row) = raster.grid().cell_at(center)?;
    samples_at(raster, col, row)
}

/// Index range of source cells whose centres lie in `[a, b)` along one axis.
fn centre_range(a: f64, b: f64, len: u32) -> std::ops::Range<u32> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let start = (lo - 0.5).ceil().clamp(0.0, f64::from(len));
    let end = (hi - 0.5).ceil().clamp(0.0, f64::from(len));
    start as u32..end as u32
}

fn average(raster: &RasterLayer, target: &GridGeometry, col: u32, row: u32) -> Option<Vec<f32>> {
    let t = &target.transform;
    let upper_left = Coord {
        x: t.origin_x + f64::from(col) * t.pixel_width,
        y: t.origin_y + f64::from(row) * t.pixel_height,
    };
    let lower_right = Coord {
        x: upper_left.x + t.pixel_width,
        y: upper_left.y + t.pixel_height,
    };

    let source = raster.grid();
    let (c0, r0) = source.transform.to_pixel(upper_left);
    let (c1, r1) = source.transform.to_pixel(lower_right);

    let mut sums = vec![0.0f64; raster.band_count()];
    let mut count = 0usize;
    for sr in centre_range(r0, r1, source.height) {
        for sc in centre_range(c0, c1, source.width) {
            if let Some(values) = samples_at(raster, sc, sr) {
                for (sum, value) in sums.iter_mut().zip(values) {
                    *sum += f64::from(value);
                }
                count += 1;
            }
        }
    }

    (count > 0).then(|| sums.into_iter().map(|sum| (sum / count as f64) as f32).collect())
}

/// Number of output cells covering `span`, tolerant to floating-point noise.
fn cells_along(span: f64, resolution: f64) -> Result<u32> {
    let exact = span / resolution;
    let rounded = exact.round();
    let cells = if (exact - rounded).abs() < 1e-6 {
        rounded
    } else {
        exact.ceil()
    };
    if cells > f64::from(u32::MAX) {
        return Err(RowLineError::InvalidConfig(format!(
            "resolution {resolution} is too fine for a span of {span}"
        )));
    }
    Ok((cells as u32).max(1))
}

fn overlaps(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

fn validate_ring(ring: &LineString<f64>) -> Result<()> {
    if ring.0.len() < 4 {
        return Err(RowLineError::InvalidGeometry(format!(
            "ring has {} positions, at least 4 are required",
            ring.0.len()
        )));
    }
    if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(RowLineError::InvalidGeometry(
            "ring has non-finite coordinates".to_string(),
        ));
    }
    if !ring.is_closed() {
        return Err(RowLineError::InvalidGeometry("ring is not closed".to_string()));
    }

    let segments: Vec<Line<f64>> = ring.lines().filter(|line| line.start != line.end).collect();
    let n = segments.len();
    for i in 0..n {
        for j in i + 1..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => {
                    return Err(RowLineError::InvalidGeometry(format!(
                        "ring self-intersects between segments {i} and {j}"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Reject boundaries that cannot act as a cutline.
pub fn validate_boundary(boundary: &PolygonBoundary) -> Result<()> {
    if boundary.is_empty() {
        return Err(RowLineError::InvalidGeometry(
            "boundary holds no polygons".to_string(),
        ));
    }
    for polygon in boundary.polygons().iter() {
        validate_ring(polygon.exterior())?;
        for hole in polygon.interiors() {
            validate_ring(hole)?;
        }
        if !(polygon.unsigned_area() > 0.0) {
            return Err(RowLineError::InvalidGeometry(
                "polygon has zero area".to_string(),
            ));
        }
    }
    Ok(())
}

impl RasterClipper for CutlineClipper {
    fn clip(
        &self,
        ctx: &PipelineContext,
        raster: &RasterLayer,
        boundary: Option<&PolygonBoundary>,
        target_resolution: f64,
    ) -> Result<RasterLayer> {
        if !(target_resolution.is_finite() && target_resolution > 0.0) {
            return Err(RowLineError::InvalidConfig(format!(
                "target resolution must be a positive number, got {target_resolution}"
            )));
        }

        let extent = raster.grid().extent();
        let window = match boundary {
            Some(boundary) => {
                validate_boundary(boundary)?;
                let rect = boundary.bounding_rect().ok_or_else(|| {
                    RowLineError::InvalidGeometry("boundary has no extent".to_string())
                })?;
                if !overlaps(&rect, &extent) {
                    return Err(RowLineError::EmptyIntersection {
                        boundary: rect,
                        raster: extent,
                    });
                }
                rect
            }
            None => extent,
        };

        let width = cells_along(window.width(), target_resolution)?;
        let height = cells_along(window.height(), target_resolution)?;
        let grid = GridGeometry::new(
            GeoTransform::north_up(window.min().x, window.max().y, target_resolution),
            width,
            height,
        );

        let mut bands: Vec<Band> = (0..raster.band_count())
            .map(|_| Band::from_pixel(width, height, Luma([self.nodata])))
            .collect();
        let mut valid = 0usize;

        for row in 0..height {
            for col in 0..width {
                if let Some(boundary) = boundary {
                    let center = Point::from(grid.cell_center(col, row));
                    if !boundary.polygons().contains(&center) {
                        continue;
                    }
                }
                let Some(samples) = self.sample(raster, &grid, col, row) else {
                    continue;
                };
                for (band, value) in bands.iter_mut().zip(samples) {
                    band.put_pixel(col, row, Luma([value]));
                }
                valid += 1;
            }
        }

        if valid == 0 {
            return Err(RowLineError::EmptyIntersection {
                boundary: window,
                raster: extent,
            });
        }

        debug!(
            width,
            height,
            valid,
            resampling = %self.resampling,
            "Clipped to cutline"
        );
        Ok(RasterLayer::new(grid, ctx.crs().clone(), bands)?.with_nodata(self.nodata))
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{Polygon, polygon};

    use super::*;
    use crate::types::Crs;

    fn ctx() -> PipelineContext {
        PipelineContext::detached(Crs::new("EPSG:31982"))
    }

    /// Single-band raster with value `col + 10 * row`, 1 unit cells, origin (0, height).
    fn ramp(width: u32, height: u32) -> RasterLayer {
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, f64::from(height), 1.0), width, height);
        let band = Band::from_fn(width, height, |x, y| Luma([(x + 10 * y) as f32]));
        RasterLayer::new(grid, Crs::new("EPSG:31982"), vec![band]).unwrap()
    }

    fn values(raster: &RasterLayer) -> Vec<f32> {
        raster.bands()[0].pixels().map(|p| p[0]).collect()
    }

    fn rect(min: (f64, f64), max: (f64, f64)) -> PolygonBoundary {
        PolygonBoundary::from_rect(Rect::new(Coord { x: min.0, y: min.1 }, Coord { x: max.0, y: max.1 }))
    }

    #[test]
    fn resamples_full_extent_without_boundary() {
        let clipped = CutlineClipper::default().clip(&ctx(), &ramp(4, 4), None, 2.0).unwrap();

        assert_eq!((clipped.width(), clipped.height()), (2, 2));
        assert_eq!(values(&clipped), vec![11.0, 13.0, 31.0, 33.0]);
        assert_eq!(clipped.nodata(), Some(0.0));
        assert_eq!(clipped.crs(), &Crs::new("EPSG:31982"));
    }

    #[test]
    fn average_resampling_takes_mean_of_footprint() {
        let clipper = CutlineClipper::new(Resampling::Average, 0.0);
        let clipped = clipper.clip(&ctx(), &ramp(4, 4), None, 2.0).unwrap();

        assert_eq!(values(&clipped), vec![5.5, 7.5, 25.5, 27.5]);
    }

    #[test]
    fn cell_counts_absorb_floating_point_noise() {
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, 8.0, 0.1), 200, 80);
        let raster = RasterLayer::new(grid, Crs::unspecified(), vec![Band::from_pixel(200, 80, Luma([1.0]))]).unwrap();

        let clipped = CutlineClipper::default().clip(&ctx(), &raster, None, 0.4).unwrap();

        assert_eq!((clipped.width(), clipped.height()), (50, 20));
    }

    #[test]
    fn crops_to_boundary_window() {
        let clipped = CutlineClipper::default()
            .clip(&ctx(), &ramp(10, 10), Some(&rect((2.0, 2.0), (6.0, 6.0))), 1.0)
            .unwrap();

        assert_eq!((clipped.width(), clipped.height()), (4, 4));
        let origin = clipped.grid().transform;
        assert_eq!((origin.origin_x, origin.origin_y), (2.0, 6.0));
        // Upper-left output cell is source cell (2, 4)
        assert_eq!(clipped.bands()[0].get_pixel(0, 0)[0], 42.0);
    }

    #[test]
    fn cells_outside_cutline_are_nodata() {
        let triangle: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0)];
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, 10.0, 1.0), 10, 10);
        let raster = RasterLayer::new(grid, Crs::unspecified(), vec![Band::from_pixel(10, 10, Luma([7.0]))]).unwrap();

        let clipped = CutlineClipper::new(Resampling::Nearest, -1.0)
            .clip(&ctx(), &raster, Some(&PolygonBoundary::from(triangle)), 1.0)
            .unwrap();

        let band = &clipped.bands()[0];
        assert_eq!(band.get_pixel(9, 0)[0], -1.0);
        assert_eq!(band.get_pixel(0, 9)[0], 7.0);
        assert_eq!(clipped.nodata(), Some(-1.0));
    }

    #[test]
    fn boundary_outside_raster_is_empty_intersection() {
        let err = CutlineClipper::default()
            .clip(&ctx(), &ramp(10, 10), Some(&rect((100.0, 100.0), (110.0, 110.0))), 1.0)
            .unwrap_err();
        assert!(matches!(err, RowLineError::EmptyIntersection { .. }));

        let touching = CutlineClipper::default()
            .clip(&ctx(), &ramp(10, 10), Some(&rect((10.0, 0.0), (20.0, 10.0))), 1.0)
            .unwrap_err();
        assert!(matches!(touching, RowLineError::EmptyIntersection { .. }));
    }

    #[test]
    fn self_intersecting_boundary_is_invalid() {
        let bowtie: Polygon<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 4.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0)];
        let err = CutlineClipper::default()
            .clip(&ctx(), &ramp(10, 10), Some(&PolygonBoundary::from(bowtie)), 1.0)
            .unwrap_err();
        assert!(matches!(err, RowLineError::InvalidGeometry(_)));
    }

    #[test]
    fn degenerate_boundaries_are_invalid() {
        let flat: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 2.0)];
        assert!(matches!(
            validate_boundary(&PolygonBoundary::from(flat)),
            Err(RowLineError::InvalidGeometry(_))
        ));

        let non_finite: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: f64::NAN, y: 1.0), (x: 2.0, y: 0.0)];
        assert!(matches!(
            validate_boundary(&PolygonBoundary::from(non_finite)),
            Err(RowLineError::InvalidGeometry(_))
        ));

        let empty = PolygonBoundary::new(geo_types::MultiPolygon::<f64>::new(vec![]));
        assert!(matches!(validate_boundary(&empty), Err(RowLineError::InvalidGeometry(_))));
    }

    #[test]
    fn rejects_non_positive_resolution() {
        let err = CutlineClipper::default().clip(&ctx(), &ramp(4, 4), None, 0.0).unwrap_err();
        assert!(matches!(err, RowLineError::InvalidConfig(_)));
    }

    #[test]
    fn nodata_source_cells_stay_nodata() {
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, 2.0, 1.0), 2, 2);
        let band = Band::from_fn(2, 2, |x, _| Luma([if x == 0 { 255.0 } else { 3.0 }]));
        let raster = RasterLayer::new(grid, Crs::unspecified(), vec![band])
            .unwrap()
            .with_nodata(255.0);

        let clipped = CutlineClipper::default().clip(&ctx(), &raster, None, 1.0).unwrap();

        assert_eq!(values(&clipped), vec![0.0, 3.0, 0.0, 3.0]);
    }
}
