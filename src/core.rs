use crate::structural::{self, MemberShape, StructuralDecoder, StructuralEncoder};
use crate::*;
use bytes::{BufMut, BytesMut};
use std::borrow::Cow;
use std::rc::Rc;
use std::sync::Arc;

/// Length-prefix helpers shared by the string and collection codecs.
///
/// Counts are written as little-endian i32, `-1` marking null.
#[inline]
pub fn write_length(len: usize, writer: &mut BytesMut) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| EncoderError::Encode(format!("length {} exceeds i32::MAX", len)))?;
    writer.put_i32_le(len);
    Ok(())
}

#[inline]
pub fn write_null(writer: &mut BytesMut) {
    writer.put_i32_le(cursor::NULL_LENGTH);
}

/// Error for a null marker where the static type has no null state.
pub fn unexpected_null(context: &'static str) -> EncoderError {
    EncoderError::Corrupt {
        context,
        detail: "null marker for a non-nullable value".to_string(),
    }
}

// --- fixed layout ---

/// Reinterprets a slice of primitive numbers as its in-memory bytes.
///
/// # Safety
/// `T` must be a primitive integer or float: no padding, no invalid bit patterns.
unsafe fn primitive_bytes<T: Copy>(items: &[T]) -> &[u8] {
    std::slice::from_raw_parts(items.as_ptr() as *const u8, std::mem::size_of_val(items))
}

/// Reads `count` primitives laid out back to back in one copy.
///
/// # Safety
/// Same contract as [`primitive_bytes`].
unsafe fn read_primitive_block<T: Copy + Default>(
    reader: &mut Reader<'_>,
    count: usize,
    context: &'static str,
) -> Result<Vec<T>> {
    let total = count
        .checked_mul(std::mem::size_of::<T>())
        .ok_or_else(|| EncoderError::Corrupt {
            context,
            detail: format!("element count {} overflows", count),
        })?;
    let data = reader.read_bytes(total, context)?;
    let mut items = vec![T::default(); count];
    std::ptr::copy_nonoverlapping(data.as_ptr(), items.as_mut_ptr() as *mut u8, total);
    Ok(items)
}

macro_rules! impl_fixed_layout {
    ($($ty:ty => $put:ident, $read:ident;)*) => {
        $(
            impl Encoder for $ty {
                const FIXED_SIZE: Option<usize> = Some(std::mem::size_of::<$ty>());
                const KIND: CodecKind = CodecKind::FixedLayout;

                #[inline]
                fn calculate_size(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }

                #[inline]
                fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                    writer.$put(*self);
                    Ok(())
                }

                fn encode_slice(items: &[Self], writer: &mut BytesMut) -> Result<()> {
                    if cfg!(target_endian = "little") {
                        // Safety: primitive number, little-endian memory image is the wire image.
                        writer.put_slice(unsafe { primitive_bytes(items) });
                    } else {
                        writer.reserve(std::mem::size_of_val(items));
                        for item in items {
                            writer.$put(*item);
                        }
                    }
                    Ok(())
                }
            }

            impl Decoder for $ty {
                #[inline]
                fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                    reader.$read(stringify!($ty))
                }

                fn decode_vec(reader: &mut Reader<'_>, count: usize) -> Result<Vec<Self>> {
                    if cfg!(target_endian = "little") {
                        // Safety: primitive number, every bit pattern is a valid value.
                        unsafe { read_primitive_block(reader, count, stringify!($ty)) }
                    } else {
                        let size = std::mem::size_of::<$ty>();
                        reader.ensure(count.saturating_mul(size), stringify!($ty))?;
                        let mut items = Vec::with_capacity(reader.capacity_hint(count, size));
                        for _ in 0..count {
                            items.push(reader.$read(stringify!($ty))?);
                        }
                        Ok(items)
                    }
                }
            }
        )*
    };
}

impl_fixed_layout! {
    u8 => put_u8, read_u8;
    i8 => put_i8, read_i8;
    u16 => put_u16_le, read_u16;
    i16 => put_i16_le, read_i16;
    u32 => put_u32_le, read_u32;
    i32 => put_i32_le, read_i32;
    u64 => put_u64_le, read_u64;
    i64 => put_i64_le, read_i64;
    u128 => put_u128_le, read_u128;
    i128 => put_i128_le, read_i128;
    f32 => put_f32_le, read_f32;
    f64 => put_f64_le, read_f64;
}

// --- bool ---
/// One byte, `0` or `1`.
impl Encoder for bool {
    const FIXED_SIZE: Option<usize> = Some(1);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        1
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_u8(*self as u8);
        Ok(())
    }
}

/// Checked decodes reject bytes other than `0` and `1`; unchecked decodes
/// treat any non-zero byte as `true`.
impl Decoder for bool {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        match reader.read_u8("bool")? {
            0 => Ok(false),
            1 => Ok(true),
            other if reader.is_checked() => Err(EncoderError::Corrupt {
                context: "bool",
                detail: format!("expected 0 or 1, got {}", other),
            }),
            _ => Ok(true),
        }
    }
}

// --- char ---
/// A Unicode scalar value as 4 bytes.
impl Encoder for char {
    const FIXED_SIZE: Option<usize> = Some(4);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        4
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_u32_le(*self as u32);
        Ok(())
    }
}

impl Decoder for char {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let raw = reader.read_u32("char")?;
        char::from_u32(raw).ok_or_else(|| EncoderError::Corrupt {
            context: "char",
            detail: format!("{:#x} is not a Unicode scalar value", raw),
        })
    }
}

// --- unit ---
impl Encoder for () {
    const FIXED_SIZE: Option<usize> = Some(0);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        0
    }

    fn encode(&self, _writer: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

impl Decoder for () {
    fn decode(_reader: &mut Reader<'_>) -> Result<Self> {
        Ok(())
    }
}

// --- strings ---

/// Encoded size of a string: count prefix plus two bytes per UTF-16 code unit.
#[inline]
pub fn string_size(value: &str) -> usize {
    4 + 2 * value.encode_utf16().count()
}

/// Writes `value` as a UTF-16 code-unit count followed by the code units.
pub fn encode_str(value: &str, writer: &mut BytesMut) -> Result<()> {
    let units = value.encode_utf16().count();
    writer.reserve(4 + 2 * units);
    write_length(units, writer)?;
    for unit in value.encode_utf16() {
        writer.put_u16_le(unit);
    }
    Ok(())
}

/// Reads a string, `None` for the null marker.
pub fn decode_string(reader: &mut Reader<'_>, context: &'static str) -> Result<Option<String>> {
    let max = reader.limits().max_string_len;
    let Some(units) = reader.read_length(max, context)? else {
        return Ok(None);
    };
    let data = reader.read_bytes(units * 2, context)?;
    let code_units = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(code_units)
        .collect::<std::result::Result<String, _>>()
        .map(Some)
        .map_err(|e| EncoderError::Corrupt {
            context,
            detail: e.to_string(),
        })
}

fn decode_required_string(reader: &mut Reader<'_>, context: &'static str) -> Result<String> {
    decode_string(reader, context)?.ok_or_else(|| unexpected_null(context))
}

/// Encode-only; decode into `String`, `Box<str>` or `Arc<str>`.
impl Encoder for str {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::String;

    fn calculate_size(&self) -> usize {
        string_size(self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_str(self, writer)
    }
}

impl Encoder for String {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::String;

    fn calculate_size(&self) -> usize {
        string_size(self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_str(self, writer)
    }
}

impl Decoder for String {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        decode_required_string(reader, "String")
    }
}

impl Decoder for Box<str> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(decode_required_string(reader, "Box<str>")?.into_boxed_str())
    }
}

impl Decoder for Arc<str> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(decode_required_string(reader, "Arc<str>")?.into())
    }
}

impl Decoder for Rc<str> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(decode_required_string(reader, "Rc<str>")?.into())
    }
}

// --- Option<T> ---

const fn option_max_size(style: NullStyle, inner: Option<usize>) -> Option<usize> {
    match (style, inner) {
        (NullStyle::Sentinel, max) => max,
        (NullStyle::PresenceFlag, Some(max)) => Some(4 + max),
        (NullStyle::PresenceFlag, None) => None,
    }
}

/// `None` is a single i32: `-1` for sentinel-style types, presence flag `0`
/// otherwise. `Some(v)` is `v` (sentinel) or flag `1` followed by `v`.
impl<T: Encoder> Encoder for Option<T> {
    const MAX_SIZE: Option<usize> = option_max_size(T::NULL_STYLE, T::MAX_SIZE);
    const KIND: CodecKind = CodecKind::Nullable;

    fn calculate_size(&self) -> usize {
        match (self, T::NULL_STYLE) {
            (None, _) => 4,
            (Some(value), NullStyle::Sentinel) => value.calculate_size(),
            (Some(value), NullStyle::PresenceFlag) => 4 + value.calculate_size(),
        }
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        match (self, T::NULL_STYLE) {
            (None, NullStyle::Sentinel) => {
                write_null(writer);
                Ok(())
            }
            (None, NullStyle::PresenceFlag) => {
                writer.put_i32_le(0);
                Ok(())
            }
            (Some(value), NullStyle::Sentinel) => value.encode(writer),
            (Some(value), NullStyle::PresenceFlag) => {
                writer.put_i32_le(1);
                value.encode(writer)
            }
        }
    }
}

impl<T: Decoder + Encoder> Decoder for Option<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        match T::NULL_STYLE {
            NullStyle::Sentinel => {
                if reader.peek_i32("null marker")? == cursor::NULL_LENGTH {
                    reader.advance(4, "null marker")?;
                    Ok(None)
                } else {
                    T::decode(reader).map(Some)
                }
            }
            NullStyle::PresenceFlag => match reader.read_i32("presence flag")? {
                0 => Ok(None),
                1 => T::decode(reader).map(Some),
                other if reader.is_checked() => Err(EncoderError::Corrupt {
                    context: "presence flag",
                    detail: format!("expected 0 or 1, got {}", other),
                }),
                _ => T::decode(reader).map(Some),
            },
        }
    }
}

// --- smart pointers ---

macro_rules! impl_delegating_encoder {
    ($($ptr:ident),*) => {
        $(
            impl<T: Encoder + ?Sized> Encoder for $ptr<T> {
                const FIXED_SIZE: Option<usize> = T::FIXED_SIZE;
                const MAX_SIZE: Option<usize> = T::MAX_SIZE;
                const NULL_STYLE: NullStyle = T::NULL_STYLE;
                const KIND: CodecKind = T::KIND;

                #[inline]
                fn calculate_size(&self) -> usize {
                    (**self).calculate_size()
                }

                #[inline]
                fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                    (**self).encode(writer)
                }
            }

            impl<T: Decoder> Decoder for $ptr<T> {
                fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                    T::decode(reader).map($ptr::new)
                }
            }
        )*
    };
}

impl_delegating_encoder!(Box, Arc, Rc);

impl<T: Encoder + ?Sized> Encoder for &T {
    const FIXED_SIZE: Option<usize> = T::FIXED_SIZE;
    const MAX_SIZE: Option<usize> = T::MAX_SIZE;
    const NULL_STYLE: NullStyle = T::NULL_STYLE;
    const KIND: CodecKind = T::KIND;

    fn calculate_size(&self) -> usize {
        (**self).calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        (**self).encode(writer)
    }
}

impl<B: Encoder + ToOwned + ?Sized> Encoder for Cow<'_, B> {
    const FIXED_SIZE: Option<usize> = B::FIXED_SIZE;
    const MAX_SIZE: Option<usize> = B::MAX_SIZE;
    const NULL_STYLE: NullStyle = B::NULL_STYLE;
    const KIND: CodecKind = B::KIND;

    fn calculate_size(&self) -> usize {
        (**self).calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        (**self).encode(writer)
    }
}

impl<B: ToOwned + ?Sized> Decoder for Cow<'_, B>
where
    B::Owned: Decoder,
{
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        <B::Owned as Decoder>::decode(reader).map(Cow::Owned)
    }
}

// --- tuples ---
// Structural with members Item1..ItemN.

macro_rules! impl_tuple {
    ($($T:ident: $idx:tt => $name:literal),+) => {
        impl<$($T: Encoder + 'static),+> StructuralEncoder for ($($T,)+) {
            const NAME: &'static str = "Tuple";

            fn members() -> Vec<MemberShape> {
                vec![$(MemberShape::of::<$T>($name)),+]
            }

            fn member_size(&self, index: usize) -> usize {
                match index {
                    $($idx => self.$idx.calculate_size(),)+
                    _ => 0,
                }
            }

            fn encode_member(&self, index: usize, writer: &mut BytesMut) -> Result<()> {
                match index {
                    $($idx => self.$idx.encode(writer),)+
                    _ => Ok(()),
                }
            }
        }

        impl<$($T: Encoder + 'static),+> Encoder for ($($T,)+) {
            const FIXED_SIZE: Option<usize> = structural::sum_sizes(&[$($T::FIXED_SIZE),+]);
            const MAX_SIZE: Option<usize> = structural::sum_sizes(&[$($T::MAX_SIZE),+]);
            const KIND: CodecKind = structural::structural_kind(Self::FIXED_SIZE);

            fn calculate_size(&self) -> usize {
                structural::calculate_size(self)
            }

            fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                structural::encode(self, writer)
            }
        }

        impl<$($T: Decoder + Encoder + 'static),+> StructuralDecoder for ($($T,)+) {
            const NAME: &'static str = "Tuple";

            fn members() -> Vec<MemberShape> {
                vec![$(MemberShape::of::<$T>($name)),+]
            }

            #[allow(non_snake_case)]
            fn decode_members(reader: &mut Reader<'_>, order: &[usize]) -> Result<Self> {
                $(let mut $T: Option<$T> = None;)+
                for &index in order {
                    match index {
                        $($idx => $T = Some($T::decode(reader)?),)+
                        _ => {}
                    }
                }
                Ok(($(
                    $T.ok_or_else(|| structural::missing_member($name, "Tuple"))?,
                )+))
            }
        }

        impl<$($T: Decoder + Encoder + 'static),+> Decoder for ($($T,)+) {
            fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                structural::decode(reader)
            }
        }
    };
}

impl_tuple!(A: 0 => "Item1");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6", G: 6 => "Item7");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6", G: 6 => "Item7", H: 7 => "Item8");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6", G: 6 => "Item7", H: 7 => "Item8", I: 8 => "Item9");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6", G: 6 => "Item7", H: 7 => "Item8", I: 8 => "Item9", J: 9 => "Item10");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6", G: 6 => "Item7", H: 7 => "Item8", I: 8 => "Item9", J: 9 => "Item10", K: 10 => "Item11");
impl_tuple!(A: 0 => "Item1", B: 1 => "Item2", C: 2 => "Item3", D: 3 => "Item4", E: 4 => "Item5", F: 5 => "Item6", G: 6 => "Item7", H: 7 => "Item8", I: 8 => "Item9", J: 9 => "Item10", K: 10 => "Item11", L: 11 => "Item12");

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn roundtrip<T: Encoder + Decoder>(value: &T) -> T {
        let mut buf = crate::encode(value).unwrap();
        assert_eq!(buf.len(), value.calculate_size());
        let decoded = crate::decode(&mut buf).unwrap();
        assert!(buf.is_empty());
        decoded
    }

    #[test]
    fn test_primitive_layout() {
        assert_eq!(&crate::encode(&0x01020304u32).unwrap()[..], &[4, 3, 2, 1]);
        assert_eq!(&crate::encode(&-1i16).unwrap()[..], &[0xFF, 0xFF]);
        assert_eq!(crate::encode(&1.5f64).unwrap().len(), 8);
        assert_eq!(roundtrip(&i128::MIN), i128::MIN);
        assert_eq!(roundtrip(&'\u{1F600}'), '\u{1F600}');
    }

    #[test]
    fn test_bool_strictness() {
        let data = Bytes::from_static(&[2]);
        assert!(crate::decode::<bool>(&mut data.clone()).is_err());
        assert!(crate::decode_unchecked::<bool>(&mut data.clone()).unwrap());
    }

    #[test]
    fn test_string_is_utf16() {
        let encoded = crate::encode("hé").unwrap();
        assert_eq!(&encoded[..], &[2, 0, 0, 0, b'h', 0, 0xE9, 0]);
        // Surrogate pair: one char, two code units.
        assert_eq!("😀".calculate_size(), 8);
        assert_eq!(roundtrip(&"😀 grin".to_string()), "😀 grin");
    }

    #[test]
    fn test_unpaired_surrogate_is_corrupt() {
        let mut data = Bytes::from_static(&[1, 0, 0, 0, 0x00, 0xD8]);
        assert!(matches!(
            crate::decode::<String>(&mut data),
            Err(EncoderError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_null_string_requires_option() {
        let data = Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(crate::decode::<String>(&mut data.clone()).is_err());
        assert_eq!(crate::decode::<Option<String>>(&mut data.clone()).unwrap(), None);
    }

    #[test]
    fn test_option_styles() {
        assert_eq!(&crate::encode(&None::<i32>).unwrap()[..], &[0, 0, 0, 0]);
        assert_eq!(
            &crate::encode(&Some(7i32)).unwrap()[..],
            &[1, 0, 0, 0, 7, 0, 0, 0]
        );
        assert_eq!(
            &crate::encode(&None::<String>).unwrap()[..],
            &[0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(<Option<i32> as Encoder>::MAX_SIZE, Some(8));
        assert_eq!(<Option<i32> as Encoder>::FIXED_SIZE, None);
        assert_eq!(roundtrip(&Some(Some(3u8))), Some(Some(3u8)));
        assert_eq!(roundtrip(&Some(None::<u8>)), Some(None));
    }

    #[test]
    fn test_tuple_members_sorted() {
        let value = ("x".to_string(), 5u16);
        let encoded = crate::encode(&value).unwrap();
        // Item2 is fixed-size, so it is written before the string.
        assert_eq!(&encoded[..2], &[5, 0]);
        assert_eq!(roundtrip(&value), value);
        assert_eq!(<(u8, u32) as Encoder>::FIXED_SIZE, Some(5));
        assert_eq!(<(u8, u32) as Encoder>::KIND, CodecKind::FixedLayout);
    }

    #[test]
    fn test_cow_and_pointers() {
        let cow: Cow<'_, str> = Cow::Borrowed("abc");
        let mut buf = crate::encode(&cow).unwrap();
        let back: Cow<'static, str> = crate::decode(&mut buf).unwrap();
        assert_eq!(back, "abc");
        let boxed: Box<str> = "boxed".into();
        assert_eq!(roundtrip(&boxed), boxed);
        let shared: Arc<str> = "shared".into();
        assert_eq!(roundtrip(&shared), shared);
        assert_eq!(roundtrip(&Box::new(9u64)), Box::new(9u64));
    }

    #[test]
    fn test_block_copy_roundtrip() {
        let values: Vec<f32> = vec![1.0, -2.5, f32::MAX];
        assert_eq!(roundtrip(&values), values);
        let bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(roundtrip(&bytes), bytes);
    }
}
