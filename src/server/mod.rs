//! HTTP server for the morphod daemon.
//!
//! This module provides:
//! - Configuration and secrets loading (`config`)
//! - The axum router and serving loop (`service`)
//!
//! The whole module sits behind the `server` cargo feature; embedded
//! users of [`Morpho`](crate::Morpho) never pull in the HTTP stack.

pub mod config;
pub mod service;

pub use service::{router, serve};
