//! Member-wise codec for structs, tuples and key/value pairs.
//!
//! Members are written in a canonical order: fixed-size members first, then
//! bounded ones, then members of unbounded size, with ties broken by member
//! name (byte-wise). The order and the summed size of the fixed members are
//! computed once per type. Derived non-generic types keep the layout in a
//! per-type static; generic ones share a cache in the global
//! [`CodecContainer`]. A layout depends only on the type, so encode and decode
//! see the same layout whichever container drives them.

use crate::*;
use bytes::BytesMut;
use std::cmp::Ordering;
use std::sync::Arc;

/// Static description of one struct member, as seen by the layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberShape {
    pub name: &'static str,
    pub fixed_size: Option<usize>,
    pub max_size: Option<usize>,
}

impl MemberShape {
    /// Describes a member of type `T` named `name`.
    pub const fn of<T: Encoder + ?Sized>(name: &'static str) -> Self {
        Self {
            name,
            fixed_size: T::FIXED_SIZE,
            max_size: T::MAX_SIZE,
        }
    }

    /// 0 for fixed-size, 1 for bounded, 2 for everything else.
    pub const fn size_class(&self) -> u8 {
        size_class(self.fixed_size, self.max_size)
    }
}

pub(crate) const fn size_class(fixed: Option<usize>, max: Option<usize>) -> u8 {
    match (fixed, max) {
        (Some(_), _) => 0,
        (None, Some(_)) => 1,
        (None, None) => 2,
    }
}

fn compare_members(a: &MemberShape, b: &MemberShape) -> Ordering {
    a.size_class()
        .cmp(&b.size_class())
        .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
}

/// Wire order of `members`, as indices into the declaration order.
pub fn sorted_order(members: &[MemberShape]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..members.len()).collect();
    order.sort_by(|&a, &b| compare_members(&members[a], &members[b]));
    order
}

/// Cached per-type member layout.
#[derive(Debug)]
pub struct StructLayout {
    name: &'static str,
    members: Vec<MemberShape>,
    order: Vec<usize>,
    dynamic_members: Vec<usize>,
    fixed_part_of_size: usize,
}

impl StructLayout {
    pub fn new(name: &'static str, members: Vec<MemberShape>) -> Self {
        let order = sorted_order(&members);
        let fixed_part_of_size = members.iter().filter_map(|m| m.fixed_size).sum();
        let dynamic_members = order
            .iter()
            .copied()
            .filter(|&idx| members[idx].fixed_size.is_none())
            .collect();
        Self {
            name,
            members,
            order,
            dynamic_members,
            fixed_part_of_size,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[MemberShape] {
        &self.members
    }

    /// Indices of the members in wire order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Members in wire order.
    pub fn ordered_members(&self) -> impl Iterator<Item = &MemberShape> + '_ {
        self.order.iter().map(move |&idx| &self.members[idx])
    }

    /// Indices of the members without a fixed size, in wire order.
    pub fn dynamic_members(&self) -> &[usize] {
        &self.dynamic_members
    }

    /// Sum of the sizes of all fixed-size members.
    pub fn fixed_part_of_size(&self) -> usize {
        self.fixed_part_of_size
    }

    /// Encoded size of every value, when all members are fixed-size.
    pub fn fixed_size(&self) -> Option<usize> {
        self.dynamic_members
            .is_empty()
            .then_some(self.fixed_part_of_size)
    }
}

/// Encode half of a structural codec. Generated by `#[derive(Encode)]`.
pub trait StructuralEncoder: 'static {
    /// Type name used in error messages and logs.
    const NAME: &'static str;

    /// Members in declaration order.
    fn members() -> Vec<MemberShape>;

    /// Encoded size of member `index` (declaration order).
    fn member_size(&self, index: usize) -> usize;

    /// Writes member `index` (declaration order).
    fn encode_member(&self, index: usize, writer: &mut BytesMut) -> Result<()>;

    /// Cached member layout.
    fn layout() -> Arc<StructLayout>
    where
        Self: Sized,
    {
        shared_layout::<Self>(Self::NAME, Self::members)
    }
}

/// Decode half of a structural codec. Generated by `#[derive(Decode)]`.
pub trait StructuralDecoder: Sized + 'static {
    const NAME: &'static str;

    fn members() -> Vec<MemberShape>;

    /// Reads every member, visiting them in `order`, and assembles the value.
    fn decode_members(reader: &mut Reader<'_>, order: &[usize]) -> Result<Self>;

    /// Cached member layout.
    fn layout() -> Arc<StructLayout> {
        shared_layout::<Self>(Self::NAME, Self::members)
    }
}

/// Layout of `T` from the global container's cache.
pub fn shared_layout<T: 'static>(
    name: &'static str,
    members: fn() -> Vec<MemberShape>,
) -> Arc<StructLayout> {
    CodecContainer::global().layout_for::<T>(name, members)
}

/// Sum of member sizes, or `None` if any member has no size of that kind.
pub const fn sum_sizes(sizes: &[Option<usize>]) -> Option<usize> {
    let mut total = 0usize;
    let mut i = 0;
    while i < sizes.len() {
        match sizes[i] {
            Some(size) => total += size,
            None => return None,
        }
        i += 1;
    }
    Some(total)
}

/// Codec kind of a structural type with the given fixed size.
pub const fn structural_kind(fixed_size: Option<usize>) -> CodecKind {
    match fixed_size {
        Some(_) => CodecKind::FixedLayout,
        None => CodecKind::Structural,
    }
}

/// Encoded size of a structural value.
pub fn calculate_size<T: StructuralEncoder + Encoder>(value: &T) -> usize {
    if let Some(size) = T::FIXED_SIZE {
        return size;
    }
    let layout = T::layout();
    layout.fixed_part_of_size()
        + layout
            .dynamic_members()
            .iter()
            .map(|&idx| value.member_size(idx))
            .sum::<usize>()
}

/// Writes every member of `value` in wire order.
pub fn encode<T: StructuralEncoder>(value: &T, writer: &mut BytesMut) -> Result<()> {
    let layout = T::layout();
    for &idx in layout.order() {
        value.encode_member(idx, writer)?;
    }
    Ok(())
}

/// Reads a structural value one nesting level deeper.
///
/// For an all-fixed layout the whole value is bounds-checked up front.
pub fn decode<T: StructuralDecoder>(reader: &mut Reader<'_>) -> Result<T> {
    let layout = T::layout();
    if let Some(size) = layout.fixed_size() {
        reader.ensure(size, T::NAME)?;
    }
    reader.nested(T::NAME, |reader| T::decode_members(reader, layout.order()))
}

/// Error for a member the generated decoder never filled.
pub fn missing_member(member: &'static str, struct_name: &'static str) -> EncoderError {
    StructDecodeError::MissingMember {
        member,
        struct_name,
    }
    .into()
}

/// Error for a discriminant that names no variant.
pub fn invalid_enum_value(value: i128, enum_name: &'static str) -> EncoderError {
    StructDecodeError::InvalidEnumValue { value, enum_name }.into()
}
