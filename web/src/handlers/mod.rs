//! HTTP request handlers, one module per resource.

pub mod comments;
pub mod health;
pub mod posts;
pub mod users;

pub use health::health_check;
