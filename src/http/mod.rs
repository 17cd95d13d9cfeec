//! HTTP layer: the axum router and request handlers through which the web
//! frontend drives deliveries.

pub mod handler;
