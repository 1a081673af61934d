pub mod application_handlers;
pub mod finding_handlers;
pub mod health_handlers;
pub mod project_handlers;
pub mod scan_handlers;
pub mod service_handlers;
pub mod target_handlers;

pub use health_handlers::health_check;
