//! Ruster Swap HTTP API
//! Stateless quote, approval, swap-building and simulation endpoints

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use types::*;
