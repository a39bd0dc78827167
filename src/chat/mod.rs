//! Chat module - admission, assignment, relay and conversation lifecycle.
//!
//! [`Desk`] is the entry point: every participant connection is handed to
//! [`Desk::accept`], which runs the admission protocol for its role. Closed
//! conversations are handed to a [`TranscriptSink`].

mod assign;
pub mod desk;
mod lifecycle;
mod relay;
pub mod transcript;


pub use desk::{ConnectParams, Desk, DeskOptions};
pub use transcript::{LogSink, TranscriptSink};
