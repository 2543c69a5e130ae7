//! GiveCare core — stateful engine for an SMS caregiver-support service.
//!
//! Turns inbound text messages into admission-controlled, scored, and
//! scheduled state transitions, and independently turns wall-clock time
//! into due proactive messages.

pub mod agent;
pub mod assessment;
pub mod background;
pub mod burnout;
pub mod config;
pub mod context;
pub mod error;
pub mod limits;
pub mod pipeline;
pub mod schedule;
pub mod sms;
pub mod store;
