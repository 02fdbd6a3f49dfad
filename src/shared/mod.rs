//! Data shared between the orchestrator and its isolated runners
//!
//! This module provides the scored result row and the framed message
//! channel that carries rows from a runner process back to the orchestrator.

pub mod messages;
pub mod row;

pub use messages::{read_frame, write_frame, ProtocolError, WorkerMessage};
pub use row::{ResultRow, RowKey};
