//! HTTP surface for the roulette service
//!
//! Every handler delegates to [`crate::service::CasinoService`].

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{shutdown_signal, ApiServer};
