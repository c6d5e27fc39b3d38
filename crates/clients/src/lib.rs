//! External service clients: text embedding and chat-completion
//! summarization, both with deterministic local fallbacks so a memory save
//! or context fetch never fails solely because the remote service is down.

pub mod embedding;
pub mod generator;

pub use embedding::EmbeddingClient;
pub use generator::{ChatMessage, GenerationParams, GeneratorClient, Passage, PassageRole};
