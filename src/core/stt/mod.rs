mod base;
pub mod deepgram;

// Re-export public types and traits
pub use base::{
    BaseStt, SttConfig, SttError, SttErrorCallback, SttResult, SttResultCallback,
};
pub use deepgram::{DeepgramConfig, DeepgramStt};
