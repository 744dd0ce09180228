//! # rpcwire
//!
//! A compact, length-prefixed binary codec for RPC payloads.
//!
//! - Fixed-layout values (primitives, fieldless enums, structs made only of fixed-layout members) are written as raw little-endian bytes
//! - Strings are written as a UTF-16 code-unit count followed by the code units (`-1` marks a null string)
//! - Collections are written as an element count followed by the elements (`-1` marks a null collection)
//! - Structs are written member by member, fixed-size members first, so the size of the fixed prefix is a constant
//! - Exceptions, reflection metadata (types, methods, members, constructors) and expression trees have dedicated codecs
//! - Every decode can run bounds-checked (untrusted input) or unchecked (data this process produced)
//!
//! ## Derive Macros
//!
//! `#[derive(Encode, Decode)]` builds the structural codec for named structs, tuple structs,
//! unit structs and fieldless enums.
//!
//! - `#[wire(rename = "Name")]`: Use the given name when ordering members. Members are ordered by
//!   size class (fixed, bounded, dynamic) and then by name, so renaming a member can move it on the wire.
//! - `#[wire(skip)]`: The member is not written. On decode it is set to `Default::default()`.
//!
//! ## Nullability
//!
//! A value of type `T` is never null. `Option<T>` adds a null state: strings, collections, metadata
//! and expressions reuse their own 4-byte header with the value `-1`, every other type is preceded by a
//! 4-byte presence flag (`0` or `1`).
//!
//! ## Feature Flags
//!
//! - `chrono`: `DateTime<Utc>` and `Duration` as 8-byte tick counts, `NaiveDate` and `NaiveTime`.
//! - `uuid`: `uuid::Uuid` as a 16-byte fixed-layout value.
//! - `ulid`: `ulid::Ulid` as a 16-byte fixed-layout value.
//! - `rust_decimal`: `rust_decimal::Decimal` as a 16-byte fixed-layout value.
//! - `indexmap`: `IndexMap` and `IndexSet` collections.
//! - `smol_str`: `smol_str::SmolStr` strings.

extern crate self as rpcwire;

pub mod collections;
pub mod container;
pub mod core;
pub mod cursor;
pub mod dynamic;
pub mod exception;
pub mod expression;
mod features;
pub mod reflection;
pub mod structural;

pub use bytes;
#[doc(hidden)]
pub use once_cell;
use bytes::{Buf, Bytes, BytesMut};
pub use collections::KeyValuePair;
pub use container::{CodecContainer, CodecInfo, CodecKind, ContainerConfig, DynCodec, Wire, WireValue};
pub use cursor::{BoundsCheck, DecodeLimits, Reader};
pub use dynamic::Dynamic;
pub use exception::ExceptionData;
pub use expression::{Expression, ExpressionType};
pub use reflection::{ConstructorInfo, MemberInfo, MemberKind, MethodInfo, TypeInfo, TypeRef, TypeRegistry};
pub use rpcwire_derive::{Decode, Encode};

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The value could not be encoded (e.g., it has more elements than the wire format can count).
    #[error("Encode error: {0}")]
    Encode(String),
    /// A bounds-checked decode ran out of input while reading `context`.
    #[error("Truncated input while reading {context}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        context: &'static str,
        needed: usize,
        remaining: usize,
    },
    /// The input is well-sized but malformed (negative length, invalid UTF-16, unknown enum value, ...).
    #[error("Corrupt data while reading {context}: {detail}")]
    Corrupt {
        context: &'static str,
        detail: String,
    },
    /// No codec is known for the requested runtime type.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    /// A type-erased codec was handed a value of another type.
    #[error("Type mismatch: codec for {expected} received a value of another type")]
    TypeMismatch { expected: &'static str },
    /// A type registration conflicts with an existing one.
    #[error("Registration error: {0}")]
    Registration(String),
    /// The expression node kind has no codec.
    #[error("Unsupported expression kind: {0:?}")]
    UnsupportedExpressionKind(ExpressionType),
    /// An expression node was built from arguments that do not fit its node type.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
    /// Type, method, member or constructor lookup failed while decoding metadata.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// Struct-specific decode error
    #[error(transparent)]
    StructDecode(#[from] StructDecodeError),
}

/// The result type used throughout this crate for encode/decode operations.
///
/// All `Encoder` and `Decoder` trait methods return this type.
pub type Result<T> = std::result::Result<T, EncoderError>;

/// Derive-specific error types for struct and enum operations
#[derive(Debug, thiserror::Error)]
pub enum StructDecodeError {
    #[error("Required member '{member}' not decoded for struct {struct_name}")]
    MissingMember {
        member: &'static str,
        struct_name: &'static str,
    },
    #[error("Invalid value {value} for enum {enum_name}")]
    InvalidEnumValue { value: i128, enum_name: &'static str },
}

/// Metadata lookup failures raised while decoding types, methods, members and constructors.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Unknown type '{0}'")]
    UnknownType(String),
    #[error("Method {declaring_type}.{name}({signature}) not found")]
    MethodNotFound {
        declaring_type: String,
        name: String,
        signature: String,
    },
    #[error("Member {declaring_type}.{name} not found")]
    MemberNotFound { declaring_type: String, name: String },
    #[error("Constructor {declaring_type}({signature}) not found")]
    ConstructorNotFound {
        declaring_type: String,
        signature: String,
    },
}

/// How `None` is written when a type is wrapped in `Option`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullStyle {
    /// A 4-byte flag (`0` = null, `1` = present) precedes the value.
    PresenceFlag,
    /// The value's own 4-byte header is never `-1`, so `-1` alone marks null.
    Sentinel,
}

/// Trait for types that can be encoded into the rpcwire binary format.
///
/// Implement this trait for your type to enable serialization.
/// Most users should use `#[derive(Encode)]` instead of manual implementation.
///
/// For every value `v`, `v.calculate_size()` must equal the number of bytes `v.encode()` writes.
pub trait Encoder {
    /// Size of every encoded value, when all values of the type encode to the same size.
    const FIXED_SIZE: Option<usize> = None;
    /// Upper bound of the encoded size, when the type is bounded.
    const MAX_SIZE: Option<usize> = Self::FIXED_SIZE;
    /// How `Option<Self>` represents `None`.
    const NULL_STYLE: NullStyle = NullStyle::PresenceFlag;
    /// The strategy this codec belongs to.
    const KIND: CodecKind = CodecKind::Structural;

    /// Returns the exact number of bytes `encode` writes for this value.
    fn calculate_size(&self) -> usize;

    /// Encode the value into the given buffer.
    ///
    /// # Arguments
    /// * `writer` - The buffer to write the encoded bytes into.
    fn encode(&self, writer: &mut BytesMut) -> Result<()>;

    /// Encodes a run of values back to back.
    ///
    /// Fixed-layout primitives override this with a single block copy.
    fn encode_slice(items: &[Self], writer: &mut BytesMut) -> Result<()>
    where
        Self: Sized,
    {
        for item in items {
            item.encode(writer)?;
        }
        Ok(())
    }
}

/// Trait for types that can be decoded from the rpcwire binary format.
///
/// Implement this trait for your type to enable deserialization.
/// Most users should use `#[derive(Decode)]` instead of manual implementation.
///
/// # Errors
/// Returns `EncoderError` if the value cannot be decoded or the data is invalid.
pub trait Decoder: Sized {
    /// Decode the value from the given reader, advancing it by exactly the encoded size.
    ///
    /// # Arguments
    /// * `reader` - The cursor to read the encoded bytes from.
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;

    /// Decodes `count` values written back to back.
    ///
    /// Fixed-layout primitives override this with a single block copy.
    fn decode_vec(reader: &mut Reader<'_>, count: usize) -> Result<Vec<Self>> {
        let mut items = Vec::with_capacity(reader.capacity_hint(count, 1));
        for _ in 0..count {
            items.push(Self::decode(reader)?);
        }
        Ok(items)
    }
}

/// Convenience function to encode a value to bytes.
///
/// The buffer is allocated once with the size reported by `calculate_size`.
///
/// # Example
/// ```rust
/// use rpcwire::{encode, decode, Encode, Decode};
///
/// #[derive(Encode, Decode, PartialEq, Debug)]
/// struct MyStruct {
///     id: u32,
///     name: String,
/// }
///
/// let value = MyStruct { id: 42, name: "hello".to_string() };
/// let mut buf = encode(&value).unwrap();
/// assert_eq!(buf.len(), 4 + 4 + 2 * 5);
/// let decoded: MyStruct = decode(&mut buf).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn encode<T: Encoder + ?Sized>(value: &T) -> Result<Bytes> {
    let size = value.calculate_size();
    let mut writer = BytesMut::with_capacity(size);
    value.encode(&mut writer)?;
    debug_assert_eq!(
        writer.len(),
        size,
        "encode() did not write calculate_size() bytes"
    );
    Ok(writer.freeze())
}

/// Convenience function to decode a value from bytes with bounds checking.
///
/// The reader is advanced past the decoded value. Runtime types are resolved
/// through [`CodecContainer::global`].
///
/// # Arguments
/// * `reader` - The buffer to read the encoded bytes from.
pub fn decode<T: Decoder>(reader: &mut Bytes) -> Result<T> {
    decode_with(reader, BoundsCheck::Checked, CodecContainer::global())
}

/// Decodes a value without bounds checks.
///
/// Only for data known to be well-formed, e.g. produced by this process. A
/// truncated buffer makes this panic instead of returning an error.
pub fn decode_unchecked<T: Decoder>(reader: &mut Bytes) -> Result<T> {
    decode_with(reader, BoundsCheck::Unchecked, CodecContainer::global())
}

/// Decodes a value with an explicit bounds-check mode and container.
pub fn decode_with<T: Decoder>(
    reader: &mut Bytes,
    mode: BoundsCheck,
    container: &CodecContainer,
) -> Result<T> {
    let mut cursor = Reader::with_container(reader.clone(), mode, container);
    let value = T::decode(&mut cursor)?;
    let consumed = reader.remaining() - cursor.remaining();
    reader.advance(consumed);
    Ok(value)
}
