use std::path::{Path, PathBuf};

use image::{DynamicImage, Luma};
use tracing::{info, warn};

use crate::{
    error::{Result, RowLineError},
    types::{Band, Crs, GeoTransform, GridGeometry, RasterLayer},
};

/// Parse an ESRI world file (`A D B E C F`, one value per line).
///
/// `C`/`F` locate the centre of the upper-left cell; rotated grids are rejected.
pub fn parse_world_file(text: &str) -> Result<GeoTransform> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|err| {
                RowLineError::InvalidInput(format!("world file value '{token}': {err}"))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let [a, d, b, e, c, f] = values[..] else {
        return Err(RowLineError::InvalidInput(format!(
            "world file must hold 6 values, found {}",
            values.len()
        )));
    };
    if d != 0.0 || b != 0.0 {
        return Err(RowLineError::InvalidInput(
            "rotated world files are not supported".to_string(),
        ));
    }

    Ok(GeoTransform {
        origin_x: c - a / 2.0,
        origin_y: f - e / 2.0,
        pixel_width: a,
        pixel_height: e,
    })
}

/// Sidecar world file next to `path`, if one exists.
fn find_world_file(path: &Path) -> Option<PathBuf> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mut candidates = match ext.as_str() {
        "tif" | "tiff" => vec!["tfw".to_string(), "tifw".to_string()],
        "png" => vec!["pgw".to_string()],
        "jpg" | "jpeg" => vec!["jgw".to_string(), "jpgw".to_string()],
        _ => Vec::new(),
    };
    candidates.push(format!("{ext}w"));
    candidates.push("wld".to_string());

    candidates
        .into_iter()
        .flat_map(|candidate| [candidate.clone(), candidate.to_ascii_uppercase()])
        .map(|candidate| path.with_extension(candidate))
        .find(|candidate| candidate.is_file())
}

/// Split a decoded image into one `f32` band per channel.
pub fn bands_from_image(image: &DynamicImage) -> Vec<Band> {
    let (width, height) = (image.width(), image.height());
    let channels = usize::from(image.color().channel_count());

    let samples: Vec<f32> = match image {
        DynamicImage::ImageLuma16(buffer) => buffer.as_raw().iter().map(|&v| f32::from(v)).collect(),
        DynamicImage::ImageLumaA16(buffer) => buffer.as_raw().iter().map(|&v| f32::from(v)).collect(),
        DynamicImage::ImageRgb16(buffer) => buffer.as_raw().iter().map(|&v| f32::from(v)).collect(),
        DynamicImage::ImageRgba16(buffer) => buffer.as_raw().iter().map(|&v| f32::from(v)).collect(),
        DynamicImage::ImageRgb32F(buffer) => buffer.as_raw().clone(),
        DynamicImage::ImageRgba32F(buffer) => buffer.as_raw().clone(),
        other => other.as_bytes().iter().map(|&v| f32::from(v)).collect(),
    };

    (0..channels)
        .map(|channel| {
            Band::from_fn(width, height, |x, y| {
                let offset = (y as usize * width as usize + x as usize) * channels + channel;
                Luma([samples[offset]])
            })
        })
        .collect()
}

/// Load an orthomosaic and georeference it from its world file.
///
/// Without a world file the raster gets unit cells with the origin at
/// `(0, height)`, so cell centres match pixel indices.
pub fn load_raster(path: impl AsRef<Path>, crs: Crs) -> Result<RasterLayer> {
    let path = path.as_ref();
    let image = image::open(path)?;
    let (width, height) = (image.width(), image.height());

    let transform = match find_world_file(path) {
        Some(world) => parse_world_file(&std::fs::read_to_string(&world)?)?,
        None => {
            warn!(path = %path.display(), "No world file found, using pixel coordinates");
            GeoTransform::north_up(0.0, f64::from(height), 1.0)
        }
    };

    let bands = bands_from_image(&image);
    info!(
        path = %path.display(),
        width,
        height,
        bands = bands.len(),
        cell_size = transform.pixel_width,
        "Loaded raster"
    );
    RasterLayer::new(GridGeometry::new(transform, width, height), crs, bands)
}
