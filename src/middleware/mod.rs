pub mod auth;
pub mod cors;
pub mod logging;

pub use auth::require_session;
pub use cors::create_cors_layer;
pub use logging::{init_logging, request_logging_middleware};
