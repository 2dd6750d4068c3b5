use std::collections::HashSet;

use geo_types::{Coord, LineString};
use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::debug;

use crate::{
    error::{Result, RowLineError},
    pipeline::PipelineContext,
    traits::Vectorizer,
    types::{BinaryRaster, LineFeatureCollection},
};

/// 4-neighbour offsets.
const STRAIGHT: [(i64, i64); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
/// Diagonal offsets.
const DIAGONAL: [(i64, i64); 4] = [(1, -1), (1, 1), (-1, 1), (-1, -1)];

/// Pixel adjacency of a skeleton under m-adjacency.
struct SkeletonGraph<'a> {
    skeleton: &'a BinaryRaster,
}

impl<'a> SkeletonGraph<'a> {
    fn new(skeleton: &'a BinaryRaster) -> Self {
        Self { skeleton }
    }

    fn is_set(&self, x: i64, y: i64) -> bool {
        x >= 0
            && y >= 0
            && x < i64::from(self.skeleton.width())
            && y < i64::from(self.skeleton.height())
            && self.skeleton.is_foreground(x as u32, y as u32)
    }

    /// Foreground neighbours of `(x, y)`; diagonals only count when no
    /// shared 4-neighbour is set.
    fn neighbours(&self, (x, y): (u32, u32)) -> Vec<(u32, u32)> {
        let (x, y) = (i64::from(x), i64::from(y));
        let straight = STRAIGHT
            .iter()
            .filter(|&&(dx, dy)| self.is_set(x + dx, y + dy));
        let diagonal = DIAGONAL.iter().filter(|&&(dx, dy)| {
            self.is_set(x + dx, y + dy) && !self.is_set(x + dx, y) && !self.is_set(x, y + dy)
        });
        straight
            .chain(diagonal)
            .map(|&(dx, dy)| ((x + dx) as u32, (y + dy) as u32))
            .collect()
    }

    fn degree(&self, pixel: (u32, u32)) -> usize {
        self.neighbours(pixel).len()
    }
}

fn edge(a: (u32, u32), b: (u32, u32)) -> ((u32, u32), (u32, u32)) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Skeleton tracer that splits the pixel graph at endpoints and junctions.
#[derive(Debug, Clone, Default)]
pub struct SkeletonTracer;

impl SkeletonTracer {
    /// Follow unvisited edges from `start` through `first` until a node is reached.
    fn walk(
        graph: &SkeletonGraph<'_>,
        visited: &mut HashSet<((u32, u32), (u32, u32))>,
        start: (u32, u32),
        first: (u32, u32),
    ) -> Vec<(u32, u32)> {
        visited.insert(edge(start, first));
        let mut path = vec![start, first];
        let mut current = first;

        while current != start && graph.degree(current) == 2 {
            let next = graph
                .neighbours(current)
                .into_iter()
                .find(|&n| !visited.contains(&edge(current, n)));
            let Some(next) = next else { break };
            visited.insert(edge(current, next));
            path.push(next);
            current = next;
        }
        path
    }

    fn pixel_chains(skeleton: &BinaryRaster) -> Vec<Vec<(u32, u32)>> {
        let graph = SkeletonGraph::new(skeleton);
        let pixels: Vec<(u32, u32)> = skeleton
            .cells()
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == BinaryRaster::FOREGROUND)
            .map(|(x, y, _)| (x, y))
            .collect();

        let mut visited = HashSet::new();
        let mut chains = Vec::new();

        // Chains that start and end at endpoints or junctions
        for &pixel in pixels.iter().filter(|&&p| graph.degree(p) != 2) {
            for neighbour in graph.neighbours(pixel) {
                if !visited.contains(&edge(pixel, neighbour)) {
                    chains.push(Self::walk(&graph, &mut visited, pixel, neighbour));
                }
            }
        }

        // Rings: every pixel has degree 2 and nothing has walked them yet
        for &pixel in &pixels {
            let open = graph
                .neighbours(pixel)
                .into_iter()
                .find(|&n| !visited.contains(&edge(pixel, n)));
            if let Some(neighbour) = open {
                chains.push(Self::walk(&graph, &mut visited, pixel, neighbour));
            }
        }

        chains
    }
}

impl Vectorizer for SkeletonTracer {
    fn trace(&self, ctx: &PipelineContext, skeleton: &BinaryRaster) -> Result<LineFeatureCollection> {
        skeleton
            .validate()
            .map_err(|err| RowLineError::TracingFailed(err.to_string()))?;

        let labels = connected_components(skeleton.cells(), Connectivity::Eight, Luma([BinaryRaster::BACKGROUND]));
        let grid = skeleton.grid();

        let mut chains = Self::pixel_chains(skeleton);
        // Stable: chains keep trace order inside their component
        chains.sort_by_key(|chain| labels.get_pixel(chain[0].0, chain[0].1)[0]);

        let lines: Vec<LineString<f64>> = chains
            .into_iter()
            .map(|chain| {
                chain
                    .into_iter()
                    .map(|(x, y)| grid.cell_center(x, y))
                    .collect::<Vec<Coord<f64>>>()
                    .into()
            })
            .collect();

        debug!(
            lines = lines.len(),
            pixels = skeleton.foreground_count(),
            "Traced skeleton"
        );
        Ok(LineFeatureCollection::from_lines(ctx.crs().clone(), lines))
    }
}

#[cfg(test)]
mod tests {
    use image::GrayImage;

    use super::*;
    use crate::types::{Crs, GeoTransform, GridGeometry};

    fn skeleton_from_rows(rows: &[&str]) -> BinaryRaster {
        let (width, height) = (rows[0].len() as u32, rows.len() as u32);
        let cells = GrayImage::from_fn(width, height, |x, y| {
            Luma([u8::from(rows[y as usize].as_bytes()[x as usize] == b'#')])
        });
        let grid = GridGeometry::new(GeoTransform::north_up(0.0, f64::from(height), 1.0), width, height);
        BinaryRaster::new(grid, Crs::new("EPSG:31982"), cells).unwrap()
    }

    fn ctx() -> PipelineContext {
        PipelineContext::detached(Crs::new("EPSG:31982"))
    }

    #[test]
    fn straight_run_becomes_one_line_through_cell_centres() {
        let skeleton = skeleton_from_rows(&[".....", ".###.", "....."]);

        let lines = SkeletonTracer.trace(&ctx(), &skeleton).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines.lines()[0].0,
            vec![
                Coord { x: 1.5, y: 1.5 },
                Coord { x: 2.5, y: 1.5 },
                Coord { x: 3.5, y: 1.5 },
            ]
        );
        assert_eq!(lines.crs(), &Crs::new("EPSG:31982"));
    }

    #[test]
    fn staircase_is_a_single_chain() {
        let skeleton = skeleton_from_rows(&[
            "##....",
            ".##...",
            "..##..",
            "...###",
        ]);

        let lines = SkeletonTracer.trace(&ctx(), &skeleton).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines.lines()[0].0.len(), 9);
    }

    #[test]
    fn junction_splits_into_three_branches() {
        let skeleton = skeleton_from_rows(&[
            ".......",
            ".#####.",
            "...#...",
            "...#...",
            ".......",
        ]);

        let lines = SkeletonTracer.trace(&ctx(), &skeleton).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines.vertex_count(), 7 + 2);
    }

    #[test]
    fn ring_yields_closed_line() {
        let skeleton = skeleton_from_rows(&[".....", ".###.", ".#.#.", ".###.", "....."]);

        let lines = SkeletonTracer.trace(&ctx(), &skeleton).unwrap();

        assert_eq!(lines.len(), 1);
        let ring = &lines.lines()[0];
        assert_eq!(ring.0.len(), 9);
        assert_eq!(ring.0.first(), ring.0.last());
    }

    #[test]
    fn lines_are_grouped_by_component() {
        let skeleton = skeleton_from_rows(&[
            ".###..",
            ".#.#..",
            ".###..",
            "......",
            "####..",
        ]);

        let lines = SkeletonTracer.trace(&ctx(), &skeleton).unwrap();

        assert_eq!(lines.len(), 2);
        let ring = &lines.lines()[0];
        assert_eq!(ring.0.len(), 9);
        assert_eq!(ring.0[0], Coord { x: 1.5, y: 4.5 });
        assert_eq!(lines.lines()[1].0.len(), 4);
    }

    #[test]
    fn isolated_pixels_and_empty_rasters_trace_to_nothing() {
        let lines = SkeletonTracer
            .trace(&ctx(), &skeleton_from_rows(&["#...", "..#."]))
            .unwrap();
        assert!(lines.is_empty());

        let lines = SkeletonTracer.trace(&ctx(), &skeleton_from_rows(&["...."])).unwrap();
        assert!(lines.is_empty());
    }
}
