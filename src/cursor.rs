//! Read cursor over an encoded buffer.
//!
//! A [`Reader`] owns the remaining input (`bytes::Bytes` tracks position and
//! remaining length), the caller-selected [`BoundsCheck`] mode, the
//! [`DecodeLimits`] and the [`CodecContainer`] used to resolve runtime types.

use crate::{CodecContainer, EncoderError, Result};
use bytes::{Buf, Bytes};

/// Length value that marks a null string, collection, or metadata reference.
pub const NULL_LENGTH: i32 = -1;

/// Trust boundary selected by the caller of a decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundsCheck {
    /// Every read is validated against the remaining input. Required for untrusted input.
    #[default]
    Checked,
    /// Length and bounds validation is skipped. Reading past the end panics.
    Unchecked,
}

/// Upper bounds applied by checked decodes to lengths read from the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted element count for a collection.
    pub max_collection_len: usize,
    /// Largest accepted UTF-16 code-unit count for a string.
    pub max_string_len: usize,
    /// Deepest accepted nesting of structs, dynamic values and expression nodes.
    pub max_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_collection_len: i32::MAX as usize,
            max_string_len: i32::MAX as usize,
            max_depth: 256,
        }
    }
}

/// Cursor used by every [`crate::Decoder`].
pub struct Reader<'c> {
    buf: Bytes,
    mode: BoundsCheck,
    limits: DecodeLimits,
    container: &'c CodecContainer,
    depth: usize,
}

impl Reader<'static> {
    /// Creates a reader that resolves runtime types through [`CodecContainer::global`].
    pub fn new(buf: Bytes, mode: BoundsCheck) -> Self {
        Reader::with_container(buf, mode, CodecContainer::global())
    }

    /// Shorthand for a bounds-checked reader over the global container.
    pub fn checked(buf: Bytes) -> Self {
        Self::new(buf, BoundsCheck::Checked)
    }

    /// Shorthand for an unchecked reader over the global container.
    pub fn unchecked(buf: Bytes) -> Self {
        Self::new(buf, BoundsCheck::Unchecked)
    }
}

impl<'c> Reader<'c> {
    /// Creates a reader bound to `container`, using its configured limits.
    pub fn with_container(buf: Bytes, mode: BoundsCheck, container: &'c CodecContainer) -> Self {
        Self {
            buf,
            mode,
            limits: container.config().limits,
            container,
            depth: 0,
        }
    }

    /// Replaces the decode limits.
    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn mode(&self) -> BoundsCheck {
        self.mode
    }

    pub fn is_checked(&self) -> bool {
        self.mode == BoundsCheck::Checked
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// The container that resolves type names met in the input.
    pub fn container(&self) -> &'c CodecContainer {
        self.container
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns the unread input, consuming the reader.
    pub fn into_inner(self) -> Bytes {
        self.buf
    }

    /// Fails with [`EncoderError::Truncated`] when fewer than `needed` bytes remain.
    ///
    /// Always succeeds in unchecked mode.
    #[inline]
    pub fn ensure(&self, needed: usize, context: &'static str) -> Result<()> {
        if self.is_checked() && self.buf.remaining() < needed {
            return Err(EncoderError::Truncated {
                context,
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self, context: &'static str) -> Result<u8> {
        self.ensure(1, context)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self, context: &'static str) -> Result<i8> {
        self.ensure(1, context)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self, context: &'static str) -> Result<u16> {
        self.ensure(2, context)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_i16(&mut self, context: &'static str) -> Result<i16> {
        self.ensure(2, context)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32> {
        self.ensure(4, context)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self, context: &'static str) -> Result<i32> {
        self.ensure(4, context)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u64(&mut self, context: &'static str) -> Result<u64> {
        self.ensure(8, context)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_i64(&mut self, context: &'static str) -> Result<i64> {
        self.ensure(8, context)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_u128(&mut self, context: &'static str) -> Result<u128> {
        self.ensure(16, context)?;
        Ok(self.buf.get_u128_le())
    }

    pub fn read_i128(&mut self, context: &'static str) -> Result<i128> {
        self.ensure(16, context)?;
        Ok(self.buf.get_i128_le())
    }

    pub fn read_f32(&mut self, context: &'static str) -> Result<f32> {
        self.ensure(4, context)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self, context: &'static str) -> Result<f64> {
        self.ensure(8, context)?;
        Ok(self.buf.get_f64_le())
    }

    /// Reads the next i32 without consuming it.
    pub fn peek_i32(&self, context: &'static str) -> Result<i32> {
        self.ensure(4, context)?;
        let mut head = &self.buf[..4];
        Ok(head.get_i32_le())
    }

    /// Reads a 4-byte length prefix. `-1` yields `None`.
    ///
    /// Any other negative value is corrupt in both modes. Checked mode also
    /// rejects counts above `limit`.
    pub fn read_length(&mut self, limit: usize, context: &'static str) -> Result<Option<usize>> {
        let raw = self.read_i32(context)?;
        if raw == NULL_LENGTH {
            return Ok(None);
        }
        if raw < 0 {
            return Err(EncoderError::Corrupt {
                context,
                detail: format!("negative length {}", raw),
            });
        }
        let len = raw as usize;
        if self.is_checked() && len > limit {
            return Err(EncoderError::Corrupt {
                context,
                detail: format!("length {} exceeds limit {}", len, limit),
            });
        }
        Ok(Some(len))
    }

    /// Splits off the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize, context: &'static str) -> Result<Bytes> {
        self.ensure(len, context)?;
        Ok(self.buf.split_to(len))
    }

    /// Fills `dst` from the input.
    pub fn copy_to_slice(&mut self, dst: &mut [u8], context: &'static str) -> Result<()> {
        self.ensure(dst.len(), context)?;
        self.buf.copy_to_slice(dst);
        Ok(())
    }

    /// Skips `len` bytes.
    pub fn advance(&mut self, len: usize, context: &'static str) -> Result<()> {
        self.ensure(len, context)?;
        self.buf.advance(len);
        Ok(())
    }

    /// Capacity worth preallocating for `count` elements of at least `min_element_size` bytes.
    ///
    /// Never more than the remaining input could hold, so a forged count cannot
    /// force a huge allocation.
    pub fn capacity_hint(&self, count: usize, min_element_size: usize) -> usize {
        count.min(self.buf.remaining() / min_element_size.max(1))
    }

    /// Runs `f` one nesting level deeper, failing once `max_depth` is exceeded.
    pub fn nested<T>(
        &mut self,
        context: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.depth >= self.limits.max_depth {
            return Err(EncoderError::Corrupt {
                context,
                detail: format!("nesting deeper than {}", self.limits.max_depth),
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

impl std::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("remaining", &self.buf.remaining())
            .field("mode", &self.mode)
            .field("depth", &self.depth)
            .finish()
    }
}
