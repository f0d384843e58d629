pub mod client;
pub mod gemini;
pub mod session;

pub use client::{
    BackendClient, BackendConfig, GenerationBackend, GenerationOptions, ModelInfo,
    DEFAULT_BASE_URL,
};
pub use gemini::GeminiClient;
pub use session::BackendSession;
