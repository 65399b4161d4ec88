pub mod manager;
pub mod schema;
pub mod handlers;
pub mod export;

pub use handlers::run_database_handler;
