pub mod chat;
pub mod events;

pub use chat::{AgentService, ChatReply, ChatRequest};
pub use events::AppEvent;
