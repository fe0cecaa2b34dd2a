//! Axum-based HTTP daemon exposing markpilot to editors.
//!
//! Editors post keystroke-level completion intents and chat requests to a
//! local socket. The daemon owns the request chain
//! (`RequestCoalescer -> ResultCache -> MeteredClient -> provider`), the live
//! settings, the persisted state and the user notifications.
//!
//! # Components
//!
//! - `handlers`: Implementation of individual endpoints (completions, chat, usage, settings).
//! - `middleware`: Request ID tracking and request metrics.
//! - `routes`: Application state assembly and the router.
//! - `sessions`: One request coalescer per editor session.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;
mod sessions;

pub use routes::{create_router, AppState};
pub use sessions::SessionCoalescers;
