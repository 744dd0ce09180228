//! Sequence, set and map codecs.
//!
//! Every collection is an i32 element count (`-1` for a null collection)
//! followed by the elements in iteration order. Maps are sequences of
//! [`KeyValuePair`] elements.

use crate::core::{unexpected_null, write_length};
use crate::structural::{self, size_class, MemberShape, StructuralDecoder, StructuralEncoder};
use crate::*;
use bytes::BytesMut;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::{BuildHasher, Hash};

/// Encoded size of `len` elements: count prefix plus the elements.
pub(crate) fn elements_size<'a, T, I>(len: usize, items: I) -> usize
where
    T: Encoder + 'a,
    I: IntoIterator<Item = &'a T>,
{
    4 + match T::FIXED_SIZE {
        Some(size) => size * len,
        None => items.into_iter().map(Encoder::calculate_size).sum(),
    }
}

pub(crate) fn encode_elements<'a, T, I>(len: usize, items: I, writer: &mut BytesMut) -> Result<()>
where
    T: Encoder + 'a,
    I: IntoIterator<Item = &'a T>,
{
    write_length(len, writer)?;
    for item in items {
        item.encode(writer)?;
    }
    Ok(())
}

/// Reads a non-null element count, enforcing `max_collection_len` in checked mode.
pub(crate) fn read_count(reader: &mut Reader<'_>, context: &'static str) -> Result<usize> {
    let max = reader.limits().max_collection_len;
    reader
        .read_length(max, context)?
        .ok_or_else(|| unexpected_null(context))
}

fn decode_each<T: Decoder>(
    reader: &mut Reader<'_>,
    count: usize,
    mut push: impl FnMut(T),
) -> Result<()> {
    for _ in 0..count {
        push(T::decode(reader)?);
    }
    Ok(())
}

// --- slices and Vec ---

/// Encode-only; decode into `Vec<T>` or `Box<[T]>`.
impl<T: Encoder> Encoder for [T] {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Collection;

    fn calculate_size(&self) -> usize {
        elements_size(self.len(), self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        write_length(self.len(), writer)?;
        T::encode_slice(self, writer)
    }
}

impl<T: Encoder> Encoder for Vec<T> {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Collection;

    fn calculate_size(&self) -> usize {
        self.as_slice().calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.as_slice().encode(writer)
    }
}

impl<T: Decoder> Decoder for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let count = read_count(reader, "Vec")?;
        T::decode_vec(reader, count)
    }
}

impl<T: Decoder> Decoder for Box<[T]> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Vec::<T>::decode(reader).map(Vec::into_boxed_slice)
    }
}

// --- [T; N] ---
/// Same wire shape as `Vec<T>`; the decoded count must equal `N`.
impl<T: Encoder, const N: usize> Encoder for [T; N] {
    const FIXED_SIZE: Option<usize> = match T::FIXED_SIZE {
        Some(size) => Some(4 + size * N),
        None => None,
    };
    const MAX_SIZE: Option<usize> = match T::MAX_SIZE {
        Some(size) => Some(4 + size * N),
        None => None,
    };
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Collection;

    fn calculate_size(&self) -> usize {
        self.as_slice().calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.as_slice().encode(writer)
    }
}

impl<T: Decoder, const N: usize> Decoder for [T; N] {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let count = read_count(reader, "array")?;
        if count != N {
            return Err(EncoderError::Corrupt {
                context: "array",
                detail: format!("expected {} elements, found {}", N, count),
            });
        }
        let items = T::decode_vec(reader, count)?;
        items.try_into().map_err(|items: Vec<T>| EncoderError::Corrupt {
            context: "array",
            detail: format!("expected {} elements, decoded {}", N, items.len()),
        })
    }
}

// --- sequences ---

macro_rules! impl_sequence {
    ($($coll:ident<T $(: $bound:ident)?> => $push:ident;)*) => {
        $(
            impl<T: Encoder $(+ $bound)?> Encoder for $coll<T> {
                const NULL_STYLE: NullStyle = NullStyle::Sentinel;
                const KIND: CodecKind = CodecKind::Collection;

                fn calculate_size(&self) -> usize {
                    elements_size(self.len(), self)
                }

                fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                    encode_elements(self.len(), self, writer)
                }
            }

            impl<T: Decoder $(+ $bound)?> Decoder for $coll<T> {
                fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                    let count = read_count(reader, stringify!($coll))?;
                    let mut items = $coll::new();
                    decode_each(reader, count, |item| {
                        items.$push(item);
                    })?;
                    Ok(items)
                }
            }
        )*
    };
}

impl_sequence! {
    VecDeque<T> => push_back;
    LinkedList<T> => push_back;
    BTreeSet<T: Ord> => insert;
    BinaryHeap<T: Ord> => push;
}

impl<T: Encoder, S> Encoder for HashSet<T, S> {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Collection;

    fn calculate_size(&self) -> usize {
        elements_size(self.len(), self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_elements(self.len(), self, writer)
    }
}

impl<T: Decoder + Eq + Hash, S: BuildHasher + Default> Decoder for HashSet<T, S> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let count = read_count(reader, "HashSet")?;
        let mut items = HashSet::with_capacity_and_hasher(reader.capacity_hint(count, 1), S::default());
        decode_each(reader, count, |item| {
            items.insert(item);
        })?;
        Ok(items)
    }
}

// --- KeyValuePair ---

/// One map entry: a structural value with members `Key` and `Value`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyValuePair<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> KeyValuePair<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    pub fn into_tuple(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K, V> From<(K, V)> for KeyValuePair<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Self { key, value }
    }
}

/// Whether `Key` precedes `Value` on the wire.
const fn key_first<K: Encoder + ?Sized, V: Encoder + ?Sized>() -> bool {
    // "Key" < "Value", so the key leads unless the value has a smaller size class.
    size_class(K::FIXED_SIZE, K::MAX_SIZE) <= size_class(V::FIXED_SIZE, V::MAX_SIZE)
}

fn pair_size<K: Encoder + ?Sized, V: Encoder + ?Sized>(key: &K, value: &V) -> usize {
    match structural::sum_sizes(&[K::FIXED_SIZE, V::FIXED_SIZE]) {
        Some(size) => size,
        None => key.calculate_size() + value.calculate_size(),
    }
}

fn encode_pair<K: Encoder + ?Sized, V: Encoder + ?Sized>(
    key: &K,
    value: &V,
    writer: &mut BytesMut,
) -> Result<()> {
    if key_first::<K, V>() {
        key.encode(writer)?;
        value.encode(writer)
    } else {
        value.encode(writer)?;
        key.encode(writer)
    }
}

fn decode_pair<K: Decoder + Encoder, V: Decoder + Encoder>(reader: &mut Reader<'_>) -> Result<(K, V)> {
    if key_first::<K, V>() {
        let key = K::decode(reader)?;
        Ok((key, V::decode(reader)?))
    } else {
        let value = V::decode(reader)?;
        Ok((K::decode(reader)?, value))
    }
}

impl<K: Encoder + 'static, V: Encoder + 'static> StructuralEncoder for KeyValuePair<K, V> {
    const NAME: &'static str = "KeyValuePair";

    fn members() -> Vec<MemberShape> {
        vec![MemberShape::of::<K>("Key"), MemberShape::of::<V>("Value")]
    }

    fn member_size(&self, index: usize) -> usize {
        match index {
            0 => self.key.calculate_size(),
            _ => self.value.calculate_size(),
        }
    }

    fn encode_member(&self, index: usize, writer: &mut BytesMut) -> Result<()> {
        match index {
            0 => self.key.encode(writer),
            _ => self.value.encode(writer),
        }
    }
}

impl<K: Encoder + 'static, V: Encoder + 'static> Encoder for KeyValuePair<K, V> {
    const FIXED_SIZE: Option<usize> = structural::sum_sizes(&[K::FIXED_SIZE, V::FIXED_SIZE]);
    const MAX_SIZE: Option<usize> = structural::sum_sizes(&[K::MAX_SIZE, V::MAX_SIZE]);
    const KIND: CodecKind = structural::structural_kind(Self::FIXED_SIZE);

    fn calculate_size(&self) -> usize {
        structural::calculate_size(self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        structural::encode(self, writer)
    }
}

impl<K, V> StructuralDecoder for KeyValuePair<K, V>
where
    K: Decoder + Encoder + 'static,
    V: Decoder + Encoder + 'static,
{
    const NAME: &'static str = "KeyValuePair";

    fn members() -> Vec<MemberShape> {
        vec![MemberShape::of::<K>("Key"), MemberShape::of::<V>("Value")]
    }

    fn decode_members(reader: &mut Reader<'_>, order: &[usize]) -> Result<Self> {
        let mut key = None;
        let mut value = None;
        for &index in order {
            match index {
                0 => key = Some(K::decode(reader)?),
                _ => value = Some(V::decode(reader)?),
            }
        }
        Ok(Self {
            key: key.ok_or_else(|| structural::missing_member("Key", "KeyValuePair"))?,
            value: value.ok_or_else(|| structural::missing_member("Value", "KeyValuePair"))?,
        })
    }
}

impl<K, V> Decoder for KeyValuePair<K, V>
where
    K: Decoder + Encoder + 'static,
    V: Decoder + Encoder + 'static,
{
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        structural::decode(reader)
    }
}

// --- maps ---

fn map_size<'a, K, V, I>(len: usize, entries: I) -> usize
where
    K: Encoder + 'a,
    V: Encoder + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    4 + match structural::sum_sizes(&[K::FIXED_SIZE, V::FIXED_SIZE]) {
        Some(size) => size * len,
        None => entries.into_iter().map(|(k, v)| pair_size(k, v)).sum(),
    }
}

fn encode_map<'a, K, V, I>(len: usize, entries: I, writer: &mut BytesMut) -> Result<()>
where
    K: Encoder + 'a,
    V: Encoder + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    write_length(len, writer)?;
    for (key, value) in entries {
        encode_pair(key, value, writer)?;
    }
    Ok(())
}

impl<K: Encoder, V: Encoder, S> Encoder for HashMap<K, V, S> {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Collection;

    fn calculate_size(&self) -> usize {
        map_size(self.len(), self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_map(self.len(), self, writer)
    }
}

impl<K, V, S> Decoder for HashMap<K, V, S>
where
    K: Decoder + Encoder + Eq + Hash,
    V: Decoder + Encoder,
    S: BuildHasher + Default,
{
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let count = read_count(reader, "HashMap")?;
        let mut map = HashMap::with_capacity_and_hasher(reader.capacity_hint(count, 2), S::default());
        for _ in 0..count {
            let (key, value) = decode_pair(reader)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K: Encoder, V: Encoder> Encoder for BTreeMap<K, V> {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Collection;

    fn calculate_size(&self) -> usize {
        map_size(self.len(), self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_map(self.len(), self, writer)
    }
}

impl<K: Decoder + Encoder + Ord, V: Decoder + Encoder> Decoder for BTreeMap<K, V> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let count = read_count(reader, "BTreeMap")?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let (key, value) = decode_pair(reader)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(feature = "indexmap")]
mod index {
    use super::*;
    use indexmap::{IndexMap, IndexSet};

    impl<T: Encoder, S> Encoder for IndexSet<T, S> {
        const NULL_STYLE: NullStyle = NullStyle::Sentinel;
        const KIND: CodecKind = CodecKind::Collection;

        fn calculate_size(&self) -> usize {
            elements_size(self.len(), self)
        }

        fn encode(&self, writer: &mut BytesMut) -> Result<()> {
            encode_elements(self.len(), self, writer)
        }
    }

    impl<T: Decoder + Eq + Hash, S: BuildHasher + Default> Decoder for IndexSet<T, S> {
        fn decode(reader: &mut Reader<'_>) -> Result<Self> {
            let count = read_count(reader, "IndexSet")?;
            let mut items =
                IndexSet::with_capacity_and_hasher(reader.capacity_hint(count, 1), S::default());
            decode_each(reader, count, |item| {
                items.insert(item);
            })?;
            Ok(items)
        }
    }

    impl<K: Encoder, V: Encoder, S> Encoder for IndexMap<K, V, S> {
        const NULL_STYLE: NullStyle = NullStyle::Sentinel;
        const KIND: CodecKind = CodecKind::Collection;

        fn calculate_size(&self) -> usize {
            map_size(self.len(), self)
        }

        fn encode(&self, writer: &mut BytesMut) -> Result<()> {
            encode_map(self.len(), self, writer)
        }
    }

    impl<K, V, S> Decoder for IndexMap<K, V, S>
    where
        K: Decoder + Encoder + Eq + Hash,
        V: Decoder + Encoder,
        S: BuildHasher + Default,
    {
        fn decode(reader: &mut Reader<'_>) -> Result<Self> {
            let count = read_count(reader, "IndexMap")?;
            let mut map =
                IndexMap::with_capacity_and_hasher(reader.capacity_hint(count, 2), S::default());
            for _ in 0..count {
                let (key, value) = decode_pair(reader)?;
                map.insert(key, value);
            }
            Ok(map)
        }
    }
}
