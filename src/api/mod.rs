// HTTP surface: OpenAI-compatible routes, middleware, error mapping.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use error::{ApiError, ApiResult, ErrorDetail, ErrorResponse};
pub use server::{build_router, ApiServer, AppState};
pub use types::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelEntry, ModelList,
    Usage,
};
