//! Realtime collaborative live-coding backend: a session hub fanning out
//! edits, chat and generation results over WebSockets, with per-connection
//! rate limiting and paste-lock content protection.

pub mod app;
pub mod auth;
pub mod ccsignals;
pub mod clients;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod websocket;
pub mod ws;

pub use app::{build_router, AppState};
pub use config::Config;
