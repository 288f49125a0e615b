//! HTTP server: router, handlers and lifecycle.

mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Server;
