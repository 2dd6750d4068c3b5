use geo_types::LineString;

use crate::{
    error::{Result, RowLineError},
    pipeline::PipelineContext,
    traits::GeometrySimplifier,
    types::LineFeatureCollection,
};

fn check_inputs(ctx: &PipelineContext, lines: &LineFeatureCollection, tolerance: f64) -> Result<()> {
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(RowLineError::InvalidConfig(format!(
            "simplification tolerance must be finite and non-negative, got {tolerance}"
        )));
    }
    if lines.crs() != ctx.crs() {
        return Err(RowLineError::CrsMismatch {
            expected: ctx.crs().clone(),
            found: lines.crs().clone(),
        });
    }
    Ok(())
}

/// Apply `reduce` to every line long enough to lose a vertex.
fn simplify_each<F>(lines: &mut LineFeatureCollection, reduce: F)
where
    F: Fn(&LineString<f64>) -> LineString<f64>,
{
    for line in lines.lines_mut() {
        if line.0.len() > 2 {
            *line = reduce(line);
        }
    }
}

/// Douglas-Peucker simplifier using geo crate's implementation
#[derive(Debug, Clone, Default)]
pub struct DouglasPeuckerSimplifier;

impl GeometrySimplifier for DouglasPeuckerSimplifier {
    fn simplify(
        &self,
        ctx: &PipelineContext,
        lines: &mut LineFeatureCollection,
        tolerance: f64,
    ) -> Result<()> {
        use geo::Simplify;

        check_inputs(ctx, lines, tolerance)?;
        simplify_each(lines, |line| line.simplify(&tolerance));
        Ok(())
    }
}

/// Visvalingam-Whyatt simplifier using geo crate's implementation.
///
/// The tolerance is an area in squared ground units.
#[derive(Debug, Clone, Default)]
pub struct VisvalingamWhyattSimplifier;

impl GeometrySimplifier for VisvalingamWhyattSimplifier {
    fn simplify(
        &self,
        ctx: &PipelineContext,
        lines: &mut LineFeatureCollection,
        tolerance: f64,
    ) -> Result<()> {
        use geo::SimplifyVw;

        check_inputs(ctx, lines, tolerance)?;
        simplify_each(lines, |line| line.simplify_vw(&tolerance));
        Ok(())
    }
}
