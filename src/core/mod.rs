pub mod audio;
pub mod stt;
pub mod tts;
