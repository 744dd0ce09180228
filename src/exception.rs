//! Exception transport.
//!
//! An exception crosses the wire as three strings: its type name, its message
//! and a composed stack trace (the inner exception's message, a network
//! separator, then the local stack trace). The receiver rebuilds the outer
//! exception and hangs the composed trace off it as a generic inner exception,
//! so the remote history stays visible.

use crate::core::{decode_string, encode_str, string_size, unexpected_null};
use crate::*;
use bytes::BytesMut;
use std::error::Error;
use std::fmt;
use tracing::warn;

/// Marks where the remote part of a stack trace begins.
pub const NETWORK_SEPARATOR: &str = "--- NETWORK ---\r\n";

/// Type name of the exception every unknown exception type decodes to.
pub const GENERIC_EXCEPTION: &str = "System.Exception";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionData {
    pub type_name: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub inner: Option<Box<ExceptionData>>,
}

impl ExceptionData {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack_trace: None,
            inner: None,
        }
    }

    /// A `System.Exception` carrying `message`.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(GENERIC_EXCEPTION, message)
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_inner(mut self, inner: ExceptionData) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Builds a generic exception chain from `error` and its sources.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        Self {
            type_name: GENERIC_EXCEPTION.to_string(),
            message: error.to_string(),
            stack_trace: None,
            inner: error.source().map(|source| Box::new(Self::from_error(source))),
        }
    }

    /// Inner message, separator and stack trace as sent on the wire.
    pub fn composed_stack_trace(&self) -> Option<String> {
        match (&self.inner, &self.stack_trace) {
            (Some(inner), stack) => Some(format!(
                "{}{}{}",
                inner.message,
                NETWORK_SEPARATOR,
                stack.as_deref().unwrap_or_default()
            )),
            (None, stack) => stack.clone(),
        }
    }

    fn composed_stack_trace_size(&self) -> usize {
        match (&self.inner, &self.stack_trace) {
            (Some(inner), stack) => {
                let units = inner.message.encode_utf16().count()
                    + NETWORK_SEPARATOR.len()
                    + stack.as_deref().map_or(0, |s| s.encode_utf16().count());
                4 + 2 * units
            }
            (None, Some(stack)) => string_size(stack),
            (None, None) => 4,
        }
    }
}

impl fmt::Display for ExceptionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl Error for ExceptionData {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.as_deref().map(|inner| inner as &(dyn Error + 'static))
    }
}

impl From<&EncoderError> for ExceptionData {
    fn from(error: &EncoderError) -> Self {
        Self::from_error(error)
    }
}

impl Encoder for ExceptionData {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Exception;

    fn calculate_size(&self) -> usize {
        string_size(&self.type_name) + string_size(&self.message) + self.composed_stack_trace_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_str(&self.type_name, writer)?;
        encode_str(&self.message, writer)?;
        self.composed_stack_trace().encode(writer)
    }
}

/// Known wrappable exception types keep their name; anything else becomes a
/// `System.Exception` with the original message.
impl Decoder for ExceptionData {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let type_name =
            decode_string(reader, "exception type")?.ok_or_else(|| unexpected_null("exception type"))?;
        let message = decode_string(reader, "exception message")?.unwrap_or_default();
        let stack_trace = decode_string(reader, "exception stack trace")?;

        let type_name = if reader.container().types().is_exception(&type_name) {
            type_name
        } else {
            warn!(
                "exception type {} is not registered, decoding as {}",
                type_name, GENERIC_EXCEPTION
            );
            GENERIC_EXCEPTION.to_string()
        };
        Ok(Self {
            type_name,
            message,
            stack_trace: None,
            inner: stack_trace.map(|trace| Box::new(Self::generic(trace))),
        })
    }
}
