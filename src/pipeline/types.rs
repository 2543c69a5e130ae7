//! Pipeline result types.

/// Outcome of one pipeline run, handed back to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReply {
    /// Reply body. `None` means send nothing at all (silent spam drop).
    pub message: Option<String>,
    /// Wall-clock time spent in the pipeline.
    pub latency_ms: u64,
    /// Set when the generic fallback path was taken; for operators, never
    /// shown to the user.
    pub error: Option<String>,
}
