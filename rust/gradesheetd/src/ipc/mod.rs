mod error;
mod helpers;
mod handlers;
mod router;
mod types;

pub use handlers::core::select_workspace;
pub use router::handle_request;
pub use types::{AppState, Request};
