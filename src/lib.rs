#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub(crate) mod serde_helpers;
pub mod types;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Endpoint of a detection service running locally.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

/// Environment variable overriding [`DEFAULT_ENDPOINT`].
pub const ENDPOINT_VAR: &str = "STATS_WS_URL";
