use image::{GrayImage, Luma};
use tracing::debug;

use crate::{
    config::{BandMapping, DEFAULT_INDEX_EPSILON},
    error::Result,
    pipeline::PipelineContext,
    traits::IndexBinarizer,
    types::{BinaryRaster, RasterLayer},
};

/// Per-pixel vegetation index over the green, red and blue channels.
pub trait VegetationIndex: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, green: f64, red: f64, blue: f64) -> f64;
}

/// Green Leaf Index: `(2G - R - B) / (2G + R + B + epsilon)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreenLeafIndex {
    pub epsilon: f64,
}

impl GreenLeafIndex {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl Default for GreenLeafIndex {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_EPSILON)
    }
}

impl VegetationIndex for GreenLeafIndex {
    fn name(&self) -> &'static str {
        "gli"
    }

    fn evaluate(&self, green: f64, red: f64, blue: f64) -> f64 {
        (2.0 * green - red - blue) / (2.0 * green + red + blue + self.epsilon)
    }
}

/// Binarizer that thresholds a vegetation index computed from mapped bands
#[derive(Debug, Clone, Default)]
pub struct BandMathBinarizer<I = GreenLeafIndex> {
    pub index: I,
    pub bands: BandMapping,
}

impl<I: VegetationIndex> BandMathBinarizer<I> {
    pub fn new(index: I, bands: BandMapping) -> Self {
        Self { index, bands }
    }
}

impl<I: VegetationIndex> IndexBinarizer for BandMathBinarizer<I> {
    fn binarize(
        &self,
        ctx: &PipelineContext,
        raster: &RasterLayer,
        threshold: f64,
    ) -> Result<BinaryRaster> {
        let green = raster.band(self.bands.green)?;
        let red = raster.band(self.bands.red)?;
        let blue = raster.band(self.bands.blue)?;

        let cells = GrayImage::from_fn(raster.width(), raster.height(), |x, y| {
            let (g, r, b) = (
                green.get_pixel(x, y)[0],
                red.get_pixel(x, y)[0],
                blue.get_pixel(x, y)[0],
            );
            if raster.is_nodata(g) || raster.is_nodata(r) || raster.is_nodata(b) {
                return Luma([BinaryRaster::BACKGROUND]);
            }
            let value = self.index.evaluate(f64::from(g), f64::from(r), f64::from(b));
            Luma([u8::from(value > threshold)])
        });

        let binary = BinaryRaster::new(*raster.grid(), ctx.crs().clone(), cells)?;
        debug!(
            index = self.index.name(),
            threshold,
            foreground = binary.foreground_count(),
            "Binarized vegetation index"
        );
        Ok(binary)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        error::RowLineError,
        types::{Band, Crs, GeoTransform, GridGeometry},
    };

    fn rgb(pixels: &[[f32; 3]]) -> RasterLayer {
        let width = pixels.len() as u32;
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, 1.0, 1.0), width, 1);
        let bands = (0..3)
            .map(|b| Band::from_fn(width, 1, |x, _| Luma([pixels[x as usize][b]])))
            .collect();
        RasterLayer::new(grid, Crs::new("EPSG:31982"), bands).unwrap()
    }

    fn ctx() -> PipelineContext {
        PipelineContext::detached(Crs::new("EPSG:31982"))
    }

    #[test]
    fn green_leaf_index_matches_formula() {
        let gli = GreenLeafIndex::default();
        let value = gli.evaluate(160.0, 60.0, 50.0);
        assert!((value - 210.0 / 430.0001).abs() < 1e-12);
        assert_eq!(gli.evaluate(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn vegetation_is_foreground() {
        let raster = rgb(&[[60.0, 160.0, 50.0], [120.0, 100.0, 80.0], [0.0, 0.0, 0.0]]);

        let binary = BandMathBinarizer::<GreenLeafIndex>::default()
            .binarize(&ctx(), &raster, 0.06)
            .unwrap();

        let values: Vec<u8> = binary.cells().pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![1, 0, 0]);
    }

    #[test]
    fn threshold_is_strict() {
        // 2G - R - B = 0 gives an index of exactly 0
        let raster = rgb(&[[100.0, 100.0, 100.0]]);
        let binary = BandMathBinarizer::<GreenLeafIndex>::default()
            .binarize(&ctx(), &raster, 0.0)
            .unwrap();
        assert_eq!(binary.foreground_count(), 0);
    }

    #[test]
    fn nodata_pixels_are_background() {
        let raster = rgb(&[[5.0, 5.0, 5.0], [0.0, 9.0, 0.0], [5.0, 120.0, 0.0]]).with_nodata(5.0);
        let binary = BandMathBinarizer::<GreenLeafIndex>::default()
            .binarize(&ctx(), &raster, -2.0)
            .unwrap();
        let values: Vec<u8> = binary.cells().pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 1, 0]);
    }

    #[test]
    fn saturated_green_with_zero_band_is_background() {
        let raster = rgb(&[[0.0, 120.0, 0.0], [60.0, 160.0, 50.0]]).with_nodata(0.0);
        let binary = BandMathBinarizer::<GreenLeafIndex>::default()
            .binarize(&ctx(), &raster, 0.06)
            .unwrap();
        let values: Vec<u8> = binary.cells().pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 1]);
    }

    #[test]
    fn single_band_raster_is_rejected() {
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, 1.0, 1.0), 2, 1);
        let raster = RasterLayer::new(grid, Crs::unspecified(), vec![Band::new(2, 1)]).unwrap();

        let err = BandMathBinarizer::<GreenLeafIndex>::default()
            .binarize(&ctx(), &raster, 0.06)
            .unwrap_err();

        assert!(matches!(
            err,
            RowLineError::BandCountMismatch { requested: 2, available: 1 }
        ));
    }

    proptest! {
        #[test]
        fn output_is_one_exactly_where_index_exceeds_threshold(
            pixels in prop::collection::vec(prop::array::uniform3(0.0f32..255.0), 1..64),
            threshold in -1.0f64..1.0,
        ) {
            let raster = rgb(&pixels);
            let binarizer = BandMathBinarizer::<GreenLeafIndex>::default();
            let binary = binarizer.binarize(&ctx(), &raster, threshold).unwrap();

            for (x, [r, g, b]) in pixels.iter().enumerate() {
                let value = binary.cells().get_pixel(x as u32, 0)[0];
                prop_assert!(value <= 1);
                let expected = binarizer.index.evaluate(f64::from(*g), f64::from(*r), f64::from(*b)) > threshold;
                prop_assert_eq!(value == 1, expected);
            }
        }
    }
}
