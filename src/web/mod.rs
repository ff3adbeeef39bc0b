//! HTTP surface of the gateway.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod status;
pub mod translate;

pub use routes::*;
