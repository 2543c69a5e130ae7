//! Inbound message pipeline.
//!
//! Every inbound SMS flows through a fixed stage order:
//! 1. Signature validation (fatal on failure)
//! 2. Rate-limit admission (five concurrent bucket checks)
//! 3. Resolve-or-create user
//! 4. Subscription gate
//! 5. Context hydration + pristine snapshot
//! 6. Delegated agent turn
//! 7. Persistence of the snapshot/updated diff
//! 8. Follow-up scheduling on band and phase transitions
//! 9. Reply
//!
//! Any failure in stages 3-8 is caught at the boundary and converted to
//! a generic apologetic reply; raw errors never reach the transport.

pub mod handler;
pub mod types;

pub use handler::MessagePipeline;
pub use types::PipelineReply;
