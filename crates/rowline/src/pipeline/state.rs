use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr, VariantNames};

/// The five stages, in execution order
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize,
    Display, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash, PartialOrd, Ord
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    Clipping,
    Binarizing,
    Thinning,
    Vectorizing,
    Simplifying,
}

impl PipelineStage {
    pub const COUNT: usize = 5;

    /// 1-based progress step of the stage
    pub fn step(self) -> usize {
        match self {
            Self::Clipping => 1,
            Self::Binarizing => 2,
            Self::Thinning => 3,
            Self::Vectorizing => 4,
            Self::Simplifying => 5,
        }
    }
}

/// Result of a successful stage, as seen by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Tracing produced no lines; simplification is skipped
    TracedEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Running(PipelineStage),
    Done,
    Failed(PipelineStage),
}

impl PipelineState {
    pub fn start() -> Self {
        Self::Running(PipelineStage::Clipping)
    }

    /// Transition after the current stage succeeded.
    pub fn advance(self, outcome: StageOutcome) -> Self {
        use PipelineStage::*;

        match (self, outcome) {
            (Self::Running(Clipping), _) => Self::Running(Binarizing),
            (Self::Running(Binarizing), _) => Self::Running(Thinning),
            (Self::Running(Thinning), _) => Self::Running(Vectorizing),
            (Self::Running(Vectorizing), StageOutcome::TracedEmpty) => Self::Done,
            (Self::Running(Vectorizing), StageOutcome::Completed) => Self::Running(Simplifying),
            (Self::Running(Simplifying), _) => Self::Done,
            (terminal, _) => terminal,
        }
    }

    /// Transition after the current stage failed.
    pub fn fail(self) -> Self {
        match self {
            Self::Running(stage) => Self::Failed(stage),
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn completed_stages_walk_to_done() {
        let mut state = PipelineState::start();
        let mut visited = Vec::new();
        while let PipelineState::Running(stage) = state {
            visited.push(stage);
            state = state.advance(StageOutcome::Completed);
        }
        assert_eq!(visited, PipelineStage::iter().collect::<Vec<_>>());
        assert_eq!(state, PipelineState::Done);
    }

    #[test]
    fn empty_trace_skips_simplification() {
        let state = PipelineState::Running(PipelineStage::Vectorizing);
        assert_eq!(state.advance(StageOutcome::TracedEmpty), PipelineState::Done);
    }

    #[test]
    fn failure_is_terminal() {
        let failed = PipelineState::Running(PipelineStage::Thinning).fail();
        assert_eq!(failed, PipelineState::Failed(PipelineStage::Thinning));
        assert!(failed.is_terminal());
        assert_eq!(failed.advance(StageOutcome::Completed), failed);
        assert_eq!(PipelineState::Done.fail(), PipelineState::Done);
    }

    #[test]
    fn steps_match_stage_order() {
        let steps: Vec<usize> = PipelineStage::iter().map(PipelineStage::step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        assert_eq!(PipelineStage::iter().count(), PipelineStage::COUNT);
    }
}
