//! Shared domain and wire types for the agora petition service.

pub mod api;
pub mod models;
