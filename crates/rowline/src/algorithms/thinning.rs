use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::debug;

use crate::{
    error::Result,
    pipeline::PipelineContext,
    traits::Skeletonizer,
    types::BinaryRaster,
};

/// Clockwise neighbour offsets starting north: P2..P9 in Zhang-Suen notation.
const NEIGHBOURS: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Zhang-Suen parallel thinning.
///
/// Each iteration runs the two sub-iterations; thinning stops when an
/// iteration deletes nothing or the iteration limit is reached. Cells
/// outside the grid count as background. A sub-iteration never deletes
/// every cell of an 8-connected component, so small blobs such as a 2x2
/// block shrink to a single cell instead of vanishing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZhangSuenThinner;

impl ZhangSuenThinner {
    fn neighbours(cells: &GrayImage, x: u32, y: u32) -> [bool; 8] {
        let (width, height) = (i64::from(cells.width()), i64::from(cells.height()));
        NEIGHBOURS.map(|(dx, dy)| {
            let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
            nx >= 0
                && ny >= 0
                && nx < width
                && ny < height
                && cells.get_pixel(nx as u32, ny as u32)[0] == BinaryRaster::FOREGROUND
        })
    }

    fn deletable(p: [bool; 8], first_pass: bool) -> bool {
        let [p2, p3, p4, p5, p6, p7, p8, p9] = p;

        let count = p.iter().filter(|&&set| set).count();
        if !(2..=6).contains(&count) {
            return false;
        }

        let ring = [p2, p3, p4, p5, p6, p7, p8, p9, p2];
        let transitions = ring.windows(2).filter(|w| !w[0] && w[1]).count();
        if transitions != 1 {
            return false;
        }

        if first_pass {
            !(p2 && p4 && p6) && !(p4 && p6 && p8)
        } else {
            !(p2 && p4 && p8) && !(p2 && p6 && p8)
        }
    }

    /// One sub-iteration; returns the number of deleted cells.
    fn sub_iteration(cells: &mut GrayImage, first_pass: bool) -> usize {
        let view: &GrayImage = cells;
        let marked: Vec<(u32, u32)> = view
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == BinaryRaster::FOREGROUND)
            .filter(|&(x, y, _)| Self::deletable(Self::neighbours(view, x, y), first_pass))
            .map(|(x, y, _)| (x, y))
            .collect();
        if marked.is_empty() {
            return 0;
        }

        let deleted = Self::spare_last_cells(view, marked);
        for &(x, y) in &deleted {
            cells.put_pixel(x, y, Luma([BinaryRaster::BACKGROUND]));
        }
        deleted.len()
    }

    /// Drop the first marked cell (scan order) of every component whose
    /// cells are all marked.
    fn spare_last_cells(cells: &GrayImage, marked: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
        let labels = connected_components(cells, Connectivity::Eight, Luma([BinaryRaster::BACKGROUND]));
        let components = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;

        let mut sizes = vec![0usize; components + 1];
        for p in labels.pixels() {
            sizes[p[0] as usize] += 1;
        }
        let mut marked_per = vec![0usize; components + 1];
        for &(x, y) in &marked {
            marked_per[labels.get_pixel(x, y)[0] as usize] += 1;
        }

        let mut spared = vec![false; components + 1];
        marked
            .into_iter()
            .filter(|&(x, y)| {
                let label = labels.get_pixel(x, y)[0] as usize;
                if marked_per[label] == sizes[label] && !spared[label] {
                    spared[label] = true;
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}

impl Skeletonizer for ZhangSuenThinner {
    fn thin(
        &self,
        ctx: &PipelineContext,
        raster: &BinaryRaster,
        max_iterations: usize,
    ) -> Result<BinaryRaster> {
        raster.validate()?;

        let mut cells = raster.cells().clone();
        let mut iterations = 0;
        while iterations < max_iterations {
            iterations += 1;
            let removed = Self::sub_iteration(&mut cells, true) + Self::sub_iteration(&mut cells, false);
            if removed == 0 {
                break;
            }
        }
        debug!(iterations, max_iterations, "Thinning finished");

        BinaryRaster::new(*raster.grid(), ctx.crs().clone(), cells)
    }
}
