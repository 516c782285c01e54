//! Carrier-facing telephony transport.

mod handler;
pub mod messages;

pub use handler::media_stream_handler;
pub use messages::{StreamEvent, clear_event, media_event, mark_event};
