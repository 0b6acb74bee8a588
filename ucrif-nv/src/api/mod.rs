//! HTTP API for the Novedades service

pub mod auth;
pub mod error;
pub mod handlers;
pub mod health;

pub use auth::auth_middleware;
pub use error::ApiError;
pub use handlers::{
    add_related_item, add_task, complete_task, list_records, load_record, load_sub_collection,
    next_code, pending_tasks, save_record, stats,
};
pub use health::health_routes;
