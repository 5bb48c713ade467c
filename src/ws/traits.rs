//! Core traits for decoding inbound frames.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use super::error::WsError;

/// Message parser trait for converting one raw text frame into one message.
///
/// Every frame is a self-contained encoding of exactly one structured object,
/// so no reassembly state is carried between calls.
///
/// # Example
///
/// ```ignore
/// pub struct CsvParser;
///
/// impl MessageParser<Row> for CsvParser {
///     fn parse(&self, frame: &str) -> Result<Row, WsError> {
///         Row::from_csv(frame).map_err(|e| WsError::Transport(e.to_string()))
///     }
/// }
/// ```
pub trait MessageParser<M>: Send + Sync + 'static {
    /// Parse one inbound frame.
    fn parse(&self, frame: &str) -> Result<M, WsError>;
}

/// Decodes each frame as JSON into `M`.
#[non_exhaustive]
#[derive(Debug)]
pub struct JsonParser<M> {
    _phantom: PhantomData<fn() -> M>,
}

impl<M> JsonParser<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<M> Default for JsonParser<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonParser<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M: DeserializeOwned + 'static> MessageParser<M> for JsonParser<M> {
    fn parse(&self, frame: &str) -> Result<M, WsError> {
        crate::serde_helpers::deserialize_with_warnings(frame).map_err(WsError::MessageParse)
    }
}
