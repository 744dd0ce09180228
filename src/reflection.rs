//! Type, method, member and constructor metadata.
//!
//! Metadata travels by name: a [`TypeRef`] is written as its registered type
//! name, and methods, members and constructors as their declaring type plus
//! enough of their signature to find them again in the receiving process's
//! [`TypeRegistry`].

use crate::container::TypedCodec;
use crate::core::{decode_string, encode_str, string_size, unexpected_null};
use crate::*;
use bytes::BytesMut;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const GENERIC_PARAMETER_PREFIX: &str = "!!";
const ARRAY_SUFFIX: &str = "[]";

/// A reference to a registered type, by name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The single-dimension array type with this element type (`X[]`).
    pub fn array_of(&self) -> TypeRef {
        TypeRef::new(format!("{}{}", self.0, ARRAY_SUFFIX))
    }

    /// The element type, if this is an array type.
    pub fn element_type(&self) -> Option<TypeRef> {
        self.0.strip_suffix(ARRAY_SUFFIX).map(TypeRef::new)
    }

    /// The `position`-th generic parameter of a generic method (`!!n`).
    pub fn generic_parameter(position: usize) -> TypeRef {
        TypeRef::new(format!("{}{}", GENERIC_PARAMETER_PREFIX, position))
    }

    pub fn generic_parameter_position(&self) -> Option<usize> {
        self.0
            .strip_prefix(GENERIC_PARAMETER_PREFIX)
            .and_then(|digits| digits.parse().ok())
    }

    /// The name `T` is registered under in the global registry.
    pub fn of<T: 'static>() -> Result<TypeRef> {
        CodecContainer::global()
            .types()
            .type_ref_of::<T>()
            .ok_or_else(|| EncoderError::UnsupportedType(std::any::type_name::<T>().to_string()))
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::new(name)
    }
}

impl Encoder for TypeRef {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Type;

    fn calculate_size(&self) -> usize {
        string_size(&self.0)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_str(&self.0, writer)
    }
}

/// Fails with [`ResolutionError::UnknownType`] unless the name resolves in the
/// reader's container.
impl Decoder for TypeRef {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let name = decode_string(reader, "type name")?.ok_or_else(|| unexpected_null("type name"))?;
        let info = reader.container().types().resolve(&name)?;
        Ok(info.type_ref().clone())
    }
}

fn type_refs(names: &[&str]) -> Vec<TypeRef> {
    names.iter().map(|&name| TypeRef::new(name)).collect()
}

fn signature(types: &[TypeRef]) -> String {
    types
        .iter()
        .map(TypeRef::name)
        .collect::<Vec<_>>()
        .join(", ")
}

// --- MethodInfo ---

/// A method of a registered type.
///
/// Generic method definitions have `generic_arity > 0` and no
/// `generic_arguments`; their parameter types may name generic parameters
/// (`!!0`, `!!1`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    pub declaring_type: TypeRef,
    /// The type the method was obtained through (a derived type, or the declaring type).
    pub reflected_type: TypeRef,
    pub name: String,
    pub generic_arity: usize,
    pub generic_arguments: Option<Vec<TypeRef>>,
    pub parameter_types: Vec<TypeRef>,
    pub return_type: TypeRef,
    pub is_static: bool,
}

impl MethodInfo {
    pub fn is_generic_definition(&self) -> bool {
        self.generic_arity > 0 && self.generic_arguments.is_none()
    }

    /// Closes a generic method definition over `arguments`.
    ///
    /// `None` unless this is a generic definition of matching arity.
    pub fn make_generic(&self, arguments: Vec<TypeRef>) -> Option<MethodInfo> {
        if !self.is_generic_definition() || arguments.len() != self.generic_arity {
            return None;
        }
        Some(MethodInfo {
            generic_arguments: Some(arguments),
            ..self.clone()
        })
    }

    /// Parameter types with generic parameters replaced by the generic arguments.
    pub fn resolved_parameter_types(&self) -> Vec<TypeRef> {
        let Some(arguments) = &self.generic_arguments else {
            return self.parameter_types.clone();
        };
        self.parameter_types
            .iter()
            .map(|ty| {
                ty.generic_parameter_position()
                    .and_then(|pos| arguments.get(pos).cloned())
                    .unwrap_or_else(|| ty.clone())
            })
            .collect()
    }

    /// Comma-separated parameter type names.
    pub fn signature(&self) -> String {
        signature(&self.parameter_types)
    }
}

impl Encoder for MethodInfo {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Method;

    fn calculate_size(&self) -> usize {
        self.declaring_type.calculate_size()
            + self.reflected_type.calculate_size()
            + string_size(&self.name)
            + self.wire_generic_arguments().calculate_size()
            + self.parameter_types.calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.declaring_type.encode(writer)?;
        self.reflected_type.encode(writer)?;
        encode_str(&self.name, writer)?;
        self.wire_generic_arguments().encode(writer)?;
        self.parameter_types.encode(writer)
    }
}

impl MethodInfo {
    /// Generic arguments as written: a definition lists its own generic
    /// parameters (`!!0`, `!!1`, ...).
    fn wire_generic_arguments(&self) -> Option<Cow<'_, [TypeRef]>> {
        if self.is_generic_definition() {
            let parameters = (0..self.generic_arity).map(TypeRef::generic_parameter).collect();
            return Some(Cow::Owned(parameters));
        }
        self.generic_arguments.as_deref().map(Cow::Borrowed)
    }
}

/// Whether `arguments` are exactly `!!0..!!n`, the arguments of a definition.
fn names_own_parameters(arguments: &[TypeRef]) -> bool {
    arguments
        .iter()
        .enumerate()
        .all(|(pos, ty)| ty.generic_parameter_position() == Some(pos))
}

impl Decoder for MethodInfo {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let declaring_type = TypeRef::decode(reader)?;
        let reflected_type = TypeRef::decode(reader)?;
        let name = String::decode(reader)?;
        let generic_arguments = Option::<Vec<TypeRef>>::decode(reader)?;
        let parameter_types = Vec::<TypeRef>::decode(reader)?;
        let arity = generic_arguments.as_ref().map_or(0, Vec::len);
        let mut method =
            reader
                .container()
                .types()
                .find_method(&declaring_type, &name, arity, &parameter_types)?;
        method.reflected_type = reflected_type;
        method.generic_arguments = generic_arguments.filter(|args| !names_own_parameters(args));
        Ok(method)
    }
}

// --- MemberInfo ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
#[repr(i32)]
pub enum MemberKind {
    Field = 0,
    Property = 1,
}

/// A field or property of a registered type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberInfo {
    pub kind: MemberKind,
    pub declaring_type: TypeRef,
    pub name: String,
    pub member_type: TypeRef,
    /// Index parameter types of an indexed property, empty otherwise.
    pub index_parameters: Vec<TypeRef>,
    pub is_static: bool,
}

impl MemberInfo {
    pub fn is_indexer(&self) -> bool {
        !self.index_parameters.is_empty()
    }
}

impl Encoder for MemberInfo {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Method;

    fn calculate_size(&self) -> usize {
        self.kind.calculate_size()
            + self.declaring_type.calculate_size()
            + string_size(&self.name)
            + self.index_parameters.calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.kind.encode(writer)?;
        self.declaring_type.encode(writer)?;
        encode_str(&self.name, writer)?;
        self.index_parameters.encode(writer)
    }
}

impl Decoder for MemberInfo {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let kind = MemberKind::decode(reader)?;
        let declaring_type = TypeRef::decode(reader)?;
        let name = String::decode(reader)?;
        let index_parameters = Vec::<TypeRef>::decode(reader)?;
        reader
            .container()
            .types()
            .find_member(&declaring_type, kind, &name, &index_parameters)
    }
}

// --- ConstructorInfo ---

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstructorInfo {
    pub declaring_type: TypeRef,
    pub parameter_types: Vec<TypeRef>,
}

impl Encoder for ConstructorInfo {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Method;

    fn calculate_size(&self) -> usize {
        self.declaring_type.calculate_size() + self.parameter_types.calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.declaring_type.encode(writer)?;
        self.parameter_types.encode(writer)
    }
}

impl Decoder for ConstructorInfo {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let declaring_type = TypeRef::decode(reader)?;
        let parameter_types = Vec::<TypeRef>::decode(reader)?;
        reader
            .container()
            .types()
            .find_constructor(&declaring_type, &parameter_types)
    }
}

// --- TypeInfo ---

/// Everything the registry knows about one type name.
///
/// Built with the chained methods below and handed to
/// [`CodecContainer::register_type`].
#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub(crate) type_ref: TypeRef,
    pub(crate) type_id: Option<TypeId>,
    pub(crate) codec: Option<Arc<dyn DynCodec>>,
    pub(crate) exception: bool,
    methods: Vec<MethodInfo>,
    members: Vec<MemberInfo>,
    constructors: Vec<ConstructorInfo>,
}

impl TypeInfo {
    /// Metadata for the Rust type `T`, encoded with its own codec.
    pub fn of<T: Wire>(name: &str) -> Self {
        Self {
            type_id: Some(TypeId::of::<T>()),
            codec: Some(Arc::new(TypedCodec::<T>::new())),
            ..Self::named(name)
        }
    }

    /// Metadata with no Rust type behind it (service interfaces, exception names).
    pub fn named(name: &str) -> Self {
        Self {
            type_ref: TypeRef::new(name),
            type_id: None,
            codec: None,
            exception: false,
            methods: Vec::new(),
            members: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Marks the type as an exception that can wrap an inner exception.
    pub fn exception(mut self) -> Self {
        self.exception = true;
        self
    }

    fn push_method(mut self, name: &str, arity: usize, params: &[&str], ret: &str, is_static: bool) -> Self {
        self.methods.push(MethodInfo {
            declaring_type: self.type_ref.clone(),
            reflected_type: self.type_ref.clone(),
            name: name.to_string(),
            generic_arity: arity,
            generic_arguments: None,
            parameter_types: type_refs(params),
            return_type: TypeRef::new(ret),
            is_static,
        });
        self
    }

    pub fn method(self, name: &str, params: &[&str], ret: &str) -> Self {
        self.push_method(name, 0, params, ret, false)
    }

    pub fn static_method(self, name: &str, params: &[&str], ret: &str) -> Self {
        self.push_method(name, 0, params, ret, true)
    }

    /// A generic method definition; `params` and `ret` may use `!!n`.
    pub fn generic_method(self, name: &str, arity: usize, params: &[&str], ret: &str) -> Self {
        self.push_method(name, arity, params, ret, false)
    }

    pub fn generic_static_method(self, name: &str, arity: usize, params: &[&str], ret: &str) -> Self {
        self.push_method(name, arity, params, ret, true)
    }

    fn push_member(mut self, kind: MemberKind, name: &str, ty: &str, index: &[&str], is_static: bool) -> Self {
        self.members.push(MemberInfo {
            kind,
            declaring_type: self.type_ref.clone(),
            name: name.to_string(),
            member_type: TypeRef::new(ty),
            index_parameters: type_refs(index),
            is_static,
        });
        self
    }

    pub fn field(self, name: &str, ty: &str) -> Self {
        self.push_member(MemberKind::Field, name, ty, &[], false)
    }

    pub fn static_field(self, name: &str, ty: &str) -> Self {
        self.push_member(MemberKind::Field, name, ty, &[], true)
    }

    pub fn property(self, name: &str, ty: &str) -> Self {
        self.push_member(MemberKind::Property, name, ty, &[], false)
    }

    pub fn static_property(self, name: &str, ty: &str) -> Self {
        self.push_member(MemberKind::Property, name, ty, &[], true)
    }

    /// The indexed property `Item`.
    pub fn indexer(self, index: &[&str], ty: &str) -> Self {
        self.push_member(MemberKind::Property, "Item", ty, index, false)
    }

    pub fn constructor(mut self, params: &[&str]) -> Self {
        self.constructors.push(ConstructorInfo {
            declaring_type: self.type_ref.clone(),
            parameter_types: type_refs(params),
        });
        self
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn name(&self) -> &str {
        self.type_ref.name()
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn codec(&self) -> Option<&Arc<dyn DynCodec>> {
        self.codec.as_ref()
    }

    pub fn is_exception(&self) -> bool {
        self.exception
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    pub fn constructors(&self) -> &[ConstructorInfo] {
        &self.constructors
    }

    /// First method called `name`.
    pub fn method_named(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// First field or property called `name`.
    pub fn member_named(&self, name: &str) -> Option<&MemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn constructor_with(&self, params: &[&str]) -> Option<&ConstructorInfo> {
        self.constructors
            .iter()
            .find(|c| c.parameter_types.iter().map(TypeRef::name).eq(params.iter().copied()))
    }
}

// --- TypeRegistry ---

/// Name ↔ type metadata map shared by every codec of a container.
#[derive(Default)]
pub struct TypeRegistry {
    by_name: DashMap<Arc<str>, Arc<TypeInfo>>,
    by_type_id: DashMap<TypeId, TypeRef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the metadata for `info`'s name.
    ///
    /// Replacing is allowed as long as the name keeps pointing at the same Rust
    /// type; a name bound to another type is a [`EncoderError::Registration`].
    /// Metadata registered without a Rust type keeps the Rust type and codec
    /// already bound to the name.
    pub fn register(&self, mut info: TypeInfo) -> Result<Arc<TypeInfo>> {
        let info = match self.by_name.entry(info.type_ref.0.clone()) {
            Entry::Occupied(mut existing) => {
                let current = existing.get();
                match (current.type_id, info.type_id) {
                    (Some(old), Some(new)) if old != new => {
                        return Err(EncoderError::Registration(format!(
                            "type name '{}' is already bound to another type",
                            info.name()
                        )));
                    }
                    (Some(old), None) => {
                        info.type_id = Some(old);
                        info.codec = current.codec.clone();
                    }
                    _ => {}
                }
                let info = Arc::new(info);
                existing.insert(info.clone());
                info
            }
            Entry::Vacant(slot) => slot.insert(Arc::new(info)).value().clone(),
        };
        if let Some(id) = info.type_id {
            self.by_type_id.entry(id).or_insert_with(|| info.type_ref.clone());
        }
        debug!(
            "registered type {} ({} methods, {} members, {} constructors)",
            info.name(),
            info.methods.len(),
            info.members.len(),
            info.constructors.len()
        );
        Ok(info)
    }

    /// Looks up `name`, synthesizing array types of resolvable element types
    /// and generic parameters.
    pub fn get(&self, name: &str) -> Option<Arc<TypeInfo>> {
        if let Some(info) = self.by_name.get(name) {
            return Some(info.value().clone());
        }
        let synthesized = TypeRef::new(name);
        if synthesized.generic_parameter_position().is_some() {
            return Some(Arc::new(TypeInfo::named(name)));
        }
        let element = synthesized.element_type()?;
        self.get(element.name())
            .map(|_| Arc::new(TypeInfo::named(name)))
    }

    pub fn resolve(&self, name: &str) -> std::result::Result<Arc<TypeInfo>, ResolutionError> {
        trace!("resolving type {}", name);
        self.get(name)
            .ok_or_else(|| ResolutionError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The name the Rust type `T` was first registered under.
    pub fn type_ref_of<T: 'static>(&self) -> Option<TypeRef> {
        self.type_ref_for(TypeId::of::<T>())
    }

    pub fn type_ref_for(&self, type_id: TypeId) -> Option<TypeRef> {
        self.by_type_id.get(&type_id).map(|r| r.value().clone())
    }

    /// Whether `name` is a registered exception type that can wrap an inner exception.
    pub fn is_exception(&self, name: &str) -> bool {
        self.by_name.get(name).map_or(false, |info| info.exception)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn find_method(
        &self,
        declaring_type: &TypeRef,
        name: &str,
        generic_arity: usize,
        parameter_types: &[TypeRef],
    ) -> Result<MethodInfo> {
        let info = self.resolve(declaring_type.name())?;
        info.methods
            .iter()
            .find(|m| {
                m.name == name
                    && m.generic_arity == generic_arity
                    && m.parameter_types == parameter_types
            })
            .cloned()
            .ok_or_else(|| {
                warn!(
                    "method {}.{}({}) not found",
                    declaring_type,
                    name,
                    signature(parameter_types)
                );
                ResolutionError::MethodNotFound {
                    declaring_type: declaring_type.to_string(),
                    name: name.to_string(),
                    signature: signature(parameter_types),
                }
                .into()
            })
    }

    pub fn find_member(
        &self,
        declaring_type: &TypeRef,
        kind: MemberKind,
        name: &str,
        index_parameters: &[TypeRef],
    ) -> Result<MemberInfo> {
        let info = self.resolve(declaring_type.name())?;
        info.members
            .iter()
            .find(|m| m.kind == kind && m.name == name && m.index_parameters == index_parameters)
            .cloned()
            .ok_or_else(|| {
                warn!("member {}.{} not found", declaring_type, name);
                ResolutionError::MemberNotFound {
                    declaring_type: declaring_type.to_string(),
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn find_constructor(
        &self,
        declaring_type: &TypeRef,
        parameter_types: &[TypeRef],
    ) -> Result<ConstructorInfo> {
        let info = self.resolve(declaring_type.name())?;
        info.constructors
            .iter()
            .find(|c| c.parameter_types == parameter_types)
            .cloned()
            .ok_or_else(|| {
                warn!(
                    "constructor {}({}) not found",
                    declaring_type,
                    signature(parameter_types)
                );
                ResolutionError::ConstructorNotFound {
                    declaring_type: declaring_type.to_string(),
                    signature: signature(parameter_types),
                }
                .into()
            })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_name.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_shapes() {
        let int = TypeRef::new("System.Int32");
        assert_eq!(int.array_of().name(), "System.Int32[]");
        assert_eq!(int.array_of().element_type(), Some(int.clone()));
        assert_eq!(int.element_type(), None);
        assert_eq!(TypeRef::generic_parameter(1).name(), "!!1");
        assert_eq!(TypeRef::generic_parameter(1).generic_parameter_position(), Some(1));
        assert_eq!(int.generic_parameter_position(), None);
    }

    #[test]
    fn test_registry_synthesizes_arrays() {
        let registry = TypeRegistry::new();
        registry.register(TypeInfo::named("Shop.Order")).unwrap();
        assert!(registry.contains("Shop.Order[]"));
        assert!(registry.contains("Shop.Order[][]"));
        assert!(registry.contains("!!3"));
        assert!(!registry.contains("Shop.Missing[]"));
        assert!(matches!(
            registry.resolve("Shop.Missing"),
            Err(ResolutionError::UnknownType(_))
        ));
    }

    #[test]
    fn test_registration_conflict() {
        let registry = TypeRegistry::new();
        registry.register(TypeInfo::of::<i32>("Num")).unwrap();
        registry.register(TypeInfo::of::<i32>("Num").method("Abs", &[], "Num")).unwrap();
        assert_eq!(registry.resolve("Num").unwrap().methods().len(), 1);
        assert!(matches!(
            registry.register(TypeInfo::of::<i64>("Num")),
            Err(EncoderError::Registration(_))
        ));
        assert_eq!(registry.type_ref_of::<i32>(), Some(TypeRef::new("Num")));
    }

    #[test]
    fn test_generic_method_arguments() {
        let info = TypeInfo::named("Util").generic_static_method("Pick", 1, &["!!0", "System.Int32"], "!!0");
        let method = info.method_named("Pick").unwrap();
        assert!(method.is_generic_definition());
        assert!(method.make_generic(vec![]).is_none());
        let closed = method.make_generic(vec![TypeRef::new("System.String")]).unwrap();
        assert_eq!(
            closed.resolved_parameter_types(),
            vec![TypeRef::new("System.String"), TypeRef::new("System.Int32")]
        );
        assert!(closed.make_generic(vec![TypeRef::new("System.String")]).is_none());
    }
}
