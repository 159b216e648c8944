//! Command API server integration

mod client;

pub use client::{BackendClient, CommandReply};
