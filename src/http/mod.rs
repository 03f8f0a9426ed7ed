//! HTTP surface: health check and the WebSocket upgrade routes

pub mod routes;

pub use routes::build_router;
