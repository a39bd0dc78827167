//! Wire protocol for the live desk.
//!
//! Every frame is a JSON object discriminated by its `type` field. Client and
//! server frames are closed enums; anything else is rejected explicitly.

pub mod frames;

pub use frames::{ChatMessage, ClientFrame, ErrorCode, FrameError, Partner, ServerFrame};
