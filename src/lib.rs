pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use errors::{PipelineError, PipelineResult};
pub use state::AppState;
