// markpilot - debounced, cached and cost-metered completions for text editors
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod client;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod prompt;
pub mod server;
pub mod state;
pub mod utils;
