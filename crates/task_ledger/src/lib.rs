//! # Task Ledger
//!
//! In-memory record of every summarization task the pipeline knows about.
//!
//! The ledger is the single authority on task state: remote progress events,
//! orchestration decisions and user actions all funnel through it as partial
//! updates, and anything that needs to render or react to task state
//! subscribes to its event feed instead of polling.

mod ledger;
mod task;

pub use ledger::{LedgerEvent, TaskLedger};
pub use task::{Task, TaskKind, TaskPatch, TaskStatus, ValidationError};
