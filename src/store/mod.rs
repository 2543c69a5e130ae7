//! Persistence layer: domain records, the backend-agnostic `Database`
//! trait, version-tracked migrations, and the libSQL backend.

mod libsql_backend;
mod migrations;
mod models;
mod traits;

pub use libsql_backend::LibSqlBackend;
pub use models::{
    AssessmentResponse, AssessmentSession, LoggedMessage, MessageDirection, ScheduledMessage,
    SessionStatus, Trigger, User, WellnessScoreRow,
};
pub use traits::Database;
