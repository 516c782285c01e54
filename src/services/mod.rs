pub mod agent;
pub mod directory;

pub use agent::{AgentClient, AgentReply, AgentRequest};
pub use directory::{
    CallerProfile, ConversationRecord, DirectoryClient, TranscriptEntry, TranscriptRole,
};
