use bytes::Bytes;
use rpcwire::{decode, decode_unchecked, encode, Decode, Encode, Encoder, EncoderError};

#[derive(Encode, Decode, Debug, PartialEq)]
struct Point {
    #[wire(rename = "A")]
    a: i32,
    #[wire(rename = "B")]
    b: f64,
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Names {
    #[wire(rename = "A")]
    a: Option<String>,
    #[wire(rename = "B")]
    b: Option<String>,
}

#[test]
fn test_null_string() {
    let encoded = encode(&None::<String>).unwrap();
    assert_eq!(&encoded[..], &[0xFF, 0xFF, 0xFF, 0xFF]);

    let mut reader = encoded;
    assert_eq!(decode::<Option<String>>(&mut reader).unwrap(), None);
}

#[test]
fn test_empty_string() {
    let encoded = encode(&String::new()).unwrap();
    assert_eq!(&encoded[..], &[0, 0, 0, 0]);

    let mut reader = encoded;
    assert_eq!(decode::<String>(&mut reader).unwrap(), "");
}

#[test]
fn test_string_is_utf16() {
    let encoded = encode("hé").unwrap();
    assert_eq!(&encoded[..], &[2, 0, 0, 0, b'h', 0, 0xE9, 0]);

    // One supplementary character is two code units.
    let emoji = encode("\u{1F600}").unwrap();
    assert_eq!(emoji.len(), 4 + 4);
    assert_eq!(&emoji[..4], &[2, 0, 0, 0]);
}

#[test]
fn test_int_array() {
    let encoded = encode(&vec![1i32, 2, 3]).unwrap();
    assert_eq!(encoded.len(), 16);
    assert_eq!(
        &encoded[..],
        &[3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
    );

    let mut reader = encoded;
    assert_eq!(decode::<Vec<i32>>(&mut reader).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_fixed_struct() {
    assert_eq!(<Point as Encoder>::FIXED_SIZE, Some(12));

    let value = Point { a: 7, b: 0.5 };
    let encoded = encode(&value).unwrap();
    assert_eq!(encoded.len(), 12);
    assert_eq!(&encoded[..4], &7i32.to_le_bytes());
    assert_eq!(&encoded[4..], &0.5f64.to_le_bytes());

    let mut reader = encoded;
    assert_eq!(decode::<Point>(&mut reader).unwrap(), value);
}

#[test]
fn test_present_class_with_null_members() {
    let value = Some(Names { a: None, b: None });
    let encoded = encode(&value).unwrap();
    assert_eq!(encoded.len(), 12);
    assert_eq!(&encoded[..4], &[1, 0, 0, 0]);
    assert_eq!(&encoded[4..], &[0xFF; 8]);

    let mut reader = encoded;
    assert_eq!(decode::<Option<Names>>(&mut reader).unwrap(), value);

    let absent = encode(&None::<Names>).unwrap();
    assert_eq!(&absent[..], &[0, 0, 0, 0]);
}

#[test]
fn test_truncated_fixed_struct() {
    let encoded = encode(&Point { a: 1, b: 2.0 }).unwrap();
    let mut truncated = encoded.slice(..11);
    match decode::<Point>(&mut truncated) {
        Err(EncoderError::Truncated { needed, remaining, .. }) => {
            assert_eq!(needed, 12);
            assert_eq!(remaining, 11);
        }
        other => panic!("expected a truncation error, got {:?}", other),
    }
}

#[test]
fn test_truncated_string() {
    let mut data = Bytes::from_static(&[5, 0, 0, 0, b'a', 0]);
    assert!(matches!(
        decode::<String>(&mut data),
        Err(EncoderError::Truncated { .. })
    ));
}

#[test]
fn test_negative_length_is_corrupt() {
    let mut data = Bytes::from_static(&[0xFE, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(
        decode::<Vec<i32>>(&mut data),
        Err(EncoderError::Corrupt { .. })
    ));
}

#[test]
fn test_null_for_non_nullable_is_corrupt() {
    let mut data = Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(
        decode::<String>(&mut data),
        Err(EncoderError::Corrupt { .. })
    ));
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Leaf {
    id: u16,
    label: String,
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Branch {
    weight: f32,
    leaves: Vec<Leaf>,
    first: Option<Leaf>,
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Tree {
    name: String,
    root: Branch,
    spare: Option<Branch>,
    depth: u8,
}

fn tree() -> Tree {
    Tree {
        name: "oak".to_string(),
        root: Branch {
            weight: 1.25,
            leaves: vec![
                Leaf { id: 1, label: "a".to_string() },
                Leaf { id: 2, label: String::new() },
            ],
            first: Some(Leaf { id: 3, label: "c".to_string() }),
        },
        spare: None,
        depth: 3,
    }
}

#[test]
fn test_nested_struct_roundtrip() {
    let value = tree();
    let encoded = encode(&value).unwrap();
    assert_eq!(encoded.len(), value.calculate_size());

    let mut reader = encoded.clone();
    assert_eq!(decode::<Tree>(&mut reader).unwrap(), value);
    assert!(reader.is_empty());

    let mut reader = encoded;
    assert_eq!(decode_unchecked::<Tree>(&mut reader).unwrap(), value);
}

#[test]
fn test_nested_struct_member_order() {
    // depth (fixed) comes first, then the dynamic members by name.
    let encoded = encode(&tree()).unwrap();
    assert_eq!(encoded[0], 3);
    assert_eq!(&encoded[1..5], &3i32.to_le_bytes());
}

#[test]
fn test_every_truncation_of_nested_struct_fails() {
    let encoded = encode(&tree()).unwrap();
    for len in 0..encoded.len() {
        let mut prefix = encoded.slice(..len);
        assert!(
            decode::<Tree>(&mut prefix).is_err(),
            "prefix of {} bytes decoded",
            len
        );
    }
}

#[test]
fn test_decode_leaves_trailing_bytes() {
    let mut data = Bytes::from_static(&[1, 0, 0, 0, 9, 9]);
    assert_eq!(decode::<i32>(&mut data).unwrap(), 1);
    assert_eq!(&data[..], &[9, 9]);
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Chain {
    tag: u8,
    next: Vec<Chain>,
}

fn chain_bytes(levels: usize) -> Bytes {
    let mut data = Vec::new();
    for _ in 0..levels {
        data.push(7u8);
        data.extend_from_slice(&1i32.to_le_bytes());
    }
    data.push(7u8);
    data.extend_from_slice(&0i32.to_le_bytes());
    Bytes::from(data)
}

#[test]
fn test_recursive_struct_depth_is_limited() {
    let mut shallow = chain_bytes(100);
    let decoded: Chain = decode(&mut shallow).unwrap();
    assert!(shallow.is_empty());
    assert_eq!(encode(&decoded).unwrap(), chain_bytes(100));

    let mut deep = chain_bytes(5_000);
    assert!(matches!(
        decode::<Chain>(&mut deep),
        Err(EncoderError::Corrupt { .. })
    ));
}
