use bytes::Bytes;
use rpcwire::CodecContainer;
use std::sync::Arc;
use rpcwire::structural::{StructuralDecoder, StructuralEncoder};
use rpcwire::{decode, encode, CodecKind, Decode, Encode, Encoder, EncoderError, StructDecodeError};

// =============================================================================
// #[wire(rename)]
// =============================================================================

#[derive(Encode, Decode, Debug, PartialEq)]
struct Plain {
    first: i32,
    second: i32,
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Renamed {
    #[wire(rename = "z")]
    first: i32,
    second: i32,
}

#[test]
fn test_rename_moves_member() {
    let plain = encode(&Plain { first: 1, second: 2 }).unwrap();
    assert_eq!(&plain[..4], &1i32.to_le_bytes());

    let renamed = encode(&Renamed { first: 1, second: 2 }).unwrap();
    assert_eq!(&renamed[..4], &2i32.to_le_bytes());

    let mut reader = renamed;
    assert_eq!(
        decode::<Renamed>(&mut reader).unwrap(),
        Renamed { first: 1, second: 2 }
    );
}

#[test]
fn test_member_names() {
    let names: Vec<_> = <Renamed as StructuralEncoder>::members()
        .iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["z", "second"]);
    assert_eq!(<Renamed as StructuralDecoder>::NAME, "Renamed");
}

#[test]
fn test_layout_is_cached_per_type() {
    let first = <Renamed as StructuralEncoder>::layout();
    let second = <Renamed as StructuralEncoder>::layout();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.order(), <Renamed as StructuralDecoder>::layout().order());
    assert_eq!(first.order(), &[1, 0]);

    let generic = <Wrapper<u8> as StructuralEncoder>::layout();
    let cached = CodecContainer::global().layout_for::<Wrapper<u8>>("Wrapper", || unreachable!());
    assert!(Arc::ptr_eq(&generic, &cached));
}

// =============================================================================
// #[wire(skip)]
// =============================================================================

#[derive(Encode, Decode, Debug, PartialEq)]
struct WithCache {
    id: u32,
    #[wire(skip)]
    cache: Option<String>,
}

#[test]
fn test_skipped_member_is_not_written() {
    let value = WithCache {
        id: 9,
        cache: Some("stale".to_string()),
    };
    assert_eq!(<WithCache as Encoder>::FIXED_SIZE, Some(4));
    let encoded = encode(&value).unwrap();
    assert_eq!(&encoded[..], &9u32.to_le_bytes());

    let mut reader = encoded;
    let decoded = decode::<WithCache>(&mut reader).unwrap();
    assert_eq!(decoded, WithCache { id: 9, cache: None });
}

// =============================================================================
// Tuple, unit and generic structs
// =============================================================================

#[derive(Encode, Decode, Debug, PartialEq)]
struct Pair(u8, String);

#[derive(Encode, Decode, Debug, PartialEq)]
struct Marker;

#[derive(Encode, Decode, Debug, PartialEq)]
struct Wrapper<T> {
    inner: T,
    count: u16,
}

#[test]
fn test_tuple_struct() {
    let value = Pair(5, "x".to_string());
    let encoded = encode(&value).unwrap();
    assert_eq!(&encoded[..], &[5, 1, 0, 0, 0, b'x', 0]);

    let mut reader = encoded;
    assert_eq!(decode::<Pair>(&mut reader).unwrap(), value);
}

#[test]
fn test_unit_struct() {
    assert_eq!(<Marker as Encoder>::FIXED_SIZE, Some(0));
    assert_eq!(<Marker as Encoder>::KIND, CodecKind::FixedLayout);
    let encoded = encode(&Marker).unwrap();
    assert!(encoded.is_empty());

    let mut reader = encoded;
    assert_eq!(decode::<Marker>(&mut reader).unwrap(), Marker);
}

#[test]
fn test_generic_struct() {
    assert_eq!(<Wrapper<u64> as Encoder>::FIXED_SIZE, Some(10));
    assert_eq!(<Wrapper<String> as Encoder>::FIXED_SIZE, None);
    assert_eq!(<Wrapper<String> as Encoder>::KIND, CodecKind::Structural);

    let value = Wrapper {
        inner: "abc".to_string(),
        count: 3,
    };
    let encoded = encode(&value).unwrap();
    assert_eq!(encoded.len(), 2 + 4 + 6);
    assert_eq!(&encoded[..2], &3u16.to_le_bytes());

    let mut reader = encoded;
    assert_eq!(decode::<Wrapper<String>>(&mut reader).unwrap(), value);
}

#[test]
fn test_bounded_member_sorts_between_fixed_and_dynamic() {
    #[derive(Encode, Decode, Debug, PartialEq)]
    struct Mixed {
        a_text: String,
        b_bounded: Option<u32>,
        c_fixed: u8,
    }

    assert_eq!(<Option<u32> as Encoder>::MAX_SIZE, Some(8));
    let value = Mixed {
        a_text: String::new(),
        b_bounded: Some(7),
        c_fixed: 1,
    };
    let encoded = encode(&value).unwrap();
    assert_eq!(
        &encoded[..],
        &[1, 1, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0]
    );
    let mut reader = encoded;
    assert_eq!(decode::<Mixed>(&mut reader).unwrap(), value);
}

// =============================================================================
// Fieldless enums
// =============================================================================

#[derive(Encode, Decode, Debug, PartialEq, Clone, Copy)]
enum Color {
    Red,
    Green = 5,
    Blue,
}

#[derive(Encode, Decode, Debug, PartialEq)]
#[repr(u8)]
enum Small {
    A = 1,
    B = 2,
}

#[test]
fn test_enum_defaults_to_i32() {
    assert_eq!(<Color as Encoder>::FIXED_SIZE, Some(4));
    assert_eq!(&encode(&Color::Green).unwrap()[..], &5i32.to_le_bytes());
    assert_eq!(&encode(&Color::Blue).unwrap()[..], &6i32.to_le_bytes());

    for color in [Color::Red, Color::Green, Color::Blue] {
        let mut reader = encode(&color).unwrap();
        assert_eq!(decode::<Color>(&mut reader).unwrap(), color);
    }
}

#[test]
fn test_enum_uses_repr() {
    assert_eq!(<Small as Encoder>::FIXED_SIZE, Some(1));
    assert_eq!(&encode(&Small::B).unwrap()[..], &[2]);
}

#[test]
fn test_unknown_enum_value() {
    let mut data = Bytes::from_static(&[3]);
    match decode::<Small>(&mut data) {
        Err(EncoderError::StructDecode(StructDecodeError::InvalidEnumValue { value, enum_name })) => {
            assert_eq!(value, 3);
            assert_eq!(enum_name, "Small");
        }
        other => panic!("expected an invalid enum value, got {:?}", other),
    }
}

#[test]
fn test_enum_member_is_fixed() {
    #[derive(Encode, Decode, Debug, PartialEq)]
    struct Pixel {
        color: Color,
        alpha: u8,
    }
    assert_eq!(<Pixel as Encoder>::FIXED_SIZE, Some(5));
    let value = Pixel {
        color: Color::Blue,
        alpha: 255,
    };
    let mut reader = encode(&value).unwrap();
    assert_eq!(decode::<Pixel>(&mut reader).unwrap(), value);
}
