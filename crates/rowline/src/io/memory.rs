use crate::{error::Result, traits::FeatureSink, types::LineFeatureCollection};

/// Keeps the final lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Option<LineFeatureCollection>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the written collection, leaving the sink empty.
    pub fn take(&mut self) -> Option<LineFeatureCollection> {
        self.lines.take()
    }
}

impl FeatureSink for MemorySink {
    fn id(&self) -> String {
        "memory".to_string()
    }

    fn write(&mut self, lines: LineFeatureCollection) -> Result<()> {
        self.lines = Some(lines);
        Ok(())
    }
}
