//! Delegated agent-execution collaborator.
//!
//! The reasoning backend that turns `(message, context)` into reply text and
//! a proposed new context lives outside this crate. The pipeline only ever
//! sees the trait below; the context it hands over is a value, and the
//! context it gets back is a separate value — the two are diffed, never
//! shared.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ConversationContext;
use crate::error::AgentError;

/// One tool invocation the agent made during its turn, recorded for the
/// conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Result of one delegated agent turn.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    /// Reply text to send back to the user.
    pub message: String,
    /// Proposed new context state. The pipeline diffs this against its
    /// pristine snapshot to decide what to persist.
    pub context: ConversationContext,
    /// Which agent produced the reply (e.g. "main", "crisis").
    pub agent_name: String,
    /// Tool calls made during the turn.
    pub tool_calls: Vec<ToolCall>,
    /// Total tokens consumed, when the backend reports it.
    pub token_usage: Option<u32>,
}

/// External agent-execution backend.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run one conversational turn. The implementation owns its own
    /// timeout/cancellation; the pipeline does not impose one.
    async fn run_turn(
        &self,
        message: &str,
        context: ConversationContext,
    ) -> Result<AgentTurn, AgentError>;
}
