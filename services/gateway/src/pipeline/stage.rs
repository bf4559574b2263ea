use std::fmt;

/// Position of a call in the proxy state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Authorizing,
    Estimating,
    Reserving,
    LoggingPending,
    Transporting,
    Invoking,
    Reconciling,
    LoggingFinal,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Authorizing => "authorizing",
            PipelineStage::Estimating => "estimating",
            PipelineStage::Reserving => "reserving",
            PipelineStage::LoggingPending => "logging_pending",
            PipelineStage::Transporting => "transporting",
            PipelineStage::Invoking => "invoking",
            PipelineStage::Reconciling => "reconciling",
            PipelineStage::LoggingFinal => "logging_final",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
