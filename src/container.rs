//! Codec container: the per-type codec cache, the structural layout cache and
//! the type registry.
//!
//! Statically typed code dispatches through the [`Encoder`]/[`Decoder`] trait
//! impls directly. The container is the runtime dispatch root: it hands out
//! type-erased [`DynCodec`]s for values whose concrete type is only known by
//! name ([`Dynamic`], constants inside expression trees).

use crate::reflection::{TypeInfo, TypeRef, TypeRegistry};
use crate::structural::{MemberShape, StructLayout};
use crate::*;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Encoding strategy of a codec, in selection priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// Raw little-endian bytes of constant size.
    FixedLayout,
    /// UTF-16 count-prefixed text.
    String,
    /// Member-wise composite.
    Structural,
    /// Count-prefixed sequence, set or map.
    Collection,
    /// `Option<T>`.
    Nullable,
    /// Runtime type name followed by the value.
    Indirect,
    Exception,
    Type,
    /// Method, member and constructor metadata.
    Method,
    Expression,
}

/// Static description of a codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecInfo {
    pub type_name: &'static str,
    pub kind: CodecKind,
    pub fixed_size: Option<usize>,
    pub max_size: Option<usize>,
    pub null_style: NullStyle,
}

impl CodecInfo {
    pub fn of<T: Encoder + ?Sized>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            kind: T::KIND,
            fixed_size: T::FIXED_SIZE,
            max_size: T::MAX_SIZE,
            null_style: T::NULL_STYLE,
        }
    }
}

/// A value that can travel behind a type-erased handle.
pub trait Wire: Encoder + Decoder + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T: Encoder + Decoder + PartialEq + fmt::Debug + Send + Sync + 'static> Wire for T {}

/// Object-safe view of a [`Wire`] value.
pub trait WireValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn erased_size(&self) -> usize;
    fn erased_encode(&self, writer: &mut BytesMut) -> Result<()>;
    /// Equality with another erased value, `false` across types.
    fn eq_value(&self, other: &dyn WireValue) -> bool;
    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: Wire> WireValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn erased_size(&self) -> usize {
        self.calculate_size()
    }

    fn erased_encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.encode(writer)
    }

    fn eq_value(&self, other: &dyn WireValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Debug for dyn WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_value(f)
    }
}

/// Type-erased codec.
pub trait DynCodec: Send + Sync {
    fn info(&self) -> &CodecInfo;

    /// `TypeId` of the values this codec handles.
    fn value_type_id(&self) -> TypeId;

    fn calculate_size(&self, value: &dyn Any) -> Result<usize>;

    fn encode(&self, value: &dyn Any, writer: &mut BytesMut) -> Result<()>;

    fn decode_value(&self, reader: &mut Reader<'_>) -> Result<Arc<dyn WireValue>>;
}

impl fmt::Debug for dyn DynCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynCodec")
            .field("type_name", &self.info().type_name)
            .field("kind", &self.info().kind)
            .finish()
    }
}

/// [`DynCodec`] over the trait impls of `T`.
pub struct TypedCodec<T> {
    info: CodecInfo,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Wire> TypedCodec<T> {
    pub fn new() -> Self {
        Self {
            info: CodecInfo::of::<T>(),
            _marker: PhantomData,
        }
    }

    fn downcast<'a>(&self, value: &'a dyn Any) -> Result<&'a T> {
        value.downcast_ref::<T>().ok_or(EncoderError::TypeMismatch {
            expected: self.info.type_name,
        })
    }
}

impl<T: Wire> Default for TypedCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Wire> DynCodec for TypedCodec<T> {
    fn info(&self) -> &CodecInfo {
        &self.info
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn calculate_size(&self, value: &dyn Any) -> Result<usize> {
        Ok(self.downcast(value)?.calculate_size())
    }

    fn encode(&self, value: &dyn Any, writer: &mut BytesMut) -> Result<()> {
        self.downcast(value)?.encode(writer)
    }

    fn decode_value(&self, reader: &mut Reader<'_>) -> Result<Arc<dyn WireValue>> {
        Ok(Arc::new(T::decode(reader)?))
    }
}

/// Container settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Mode used by [`CodecContainer::decode`].
    pub bounds_check: BoundsCheck,
    pub limits: DecodeLimits,
}

impl ContainerConfig {
    pub fn with_bounds_check(mut self, bounds_check: BoundsCheck) -> Self {
        self.bounds_check = bounds_check;
        self
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_collection_len(mut self, max: usize) -> Self {
        self.limits.max_collection_len = max;
        self
    }

    pub fn with_max_string_len(mut self, max: usize) -> Self {
        self.limits.max_string_len = max;
        self
    }

    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.limits.max_depth = max;
        self
    }
}

static GLOBAL: Lazy<CodecContainer> = Lazy::new(|| CodecContainer::new(ContainerConfig::default()));

/// Codec cache and type registry.
///
/// Entries are created on first use and never evicted. When two threads race
/// to create the same entry, the first one stored wins and the other is dropped.
pub struct CodecContainer {
    config: ContainerConfig,
    codecs: DashMap<TypeId, Arc<dyn DynCodec>>,
    layouts: DashMap<TypeId, Arc<StructLayout>>,
    types: TypeRegistry,
}

impl CodecContainer {
    /// Creates a container with the builtin types registered.
    pub fn new(config: ContainerConfig) -> Self {
        let container = Self::empty(config);
        register_builtins(&container);
        container
    }

    /// Creates a container with an empty registry.
    pub fn empty(config: ContainerConfig) -> Self {
        Self {
            config,
            codecs: DashMap::new(),
            layouts: DashMap::new(),
            types: TypeRegistry::new(),
        }
    }

    /// The process-wide container used by [`crate::encode`] and [`crate::decode`].
    pub fn global() -> &'static CodecContainer {
        &GLOBAL
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The codec for `T`, created on first use.
    pub fn codec_for<T: Wire>(&self) -> Arc<dyn DynCodec> {
        let id = TypeId::of::<T>();
        if let Some(codec) = self.codecs.get(&id) {
            return codec.value().clone();
        }
        // Built outside the map lock; a concurrent insert wins.
        let built: Arc<dyn DynCodec> = Arc::new(TypedCodec::<T>::new());
        let stored = self.codecs.entry(id).or_insert(built).value().clone();
        debug!(
            "created {:?} codec for {}",
            stored.info().kind,
            stored.info().type_name
        );
        stored
    }

    /// The codec registered under `name`.
    pub fn codec_by_name(&self, name: &str) -> Result<Arc<dyn DynCodec>> {
        trace!("looking up codec for {}", name);
        self.types
            .get(name)
            .and_then(|info| info.codec().cloned())
            .ok_or_else(|| EncoderError::UnsupportedType(name.to_string()))
    }

    pub fn codec_for_type(&self, ty: &TypeRef) -> Result<Arc<dyn DynCodec>> {
        self.codec_by_name(ty.name())
    }

    /// Registers `T` under `name`. Idempotent for the same pair.
    pub fn register<T: Wire>(&self, name: &str) -> Result<TypeRef> {
        self.register_type(TypeInfo::of::<T>(name))
    }

    /// Registers type metadata, sharing the cached codec when the type has one.
    pub fn register_type(&self, mut info: TypeInfo) -> Result<TypeRef> {
        if let (Some(id), Some(codec)) = (info.type_id, info.codec.take()) {
            let shared = self.codecs.entry(id).or_insert(codec).value().clone();
            info.codec = Some(shared);
        }
        Ok(self.types.register(info)?.type_ref().clone())
    }

    /// Member layout of the structural type `T`, computed on first use.
    pub fn layout_for<T: 'static>(
        &self,
        name: &'static str,
        members: fn() -> Vec<MemberShape>,
    ) -> Arc<StructLayout> {
        let id = TypeId::of::<T>();
        if let Some(layout) = self.layouts.get(&id) {
            return layout.value().clone();
        }
        let built = Arc::new(StructLayout::new(name, members()));
        debug!(
            "computed layout for {}: {} members, fixed part {} bytes",
            name,
            built.members().len(),
            built.fixed_part_of_size()
        );
        self.layouts.entry(id).or_insert(built).value().clone()
    }

    /// Encodes `value` into a fresh buffer.
    pub fn encode<T: Encoder + ?Sized>(&self, value: &T) -> Result<Bytes> {
        crate::encode(value)
    }

    /// Decodes a `T` with the configured bounds-check mode and limits.
    pub fn decode<T: Decoder>(&self, buf: &mut Bytes) -> Result<T> {
        crate::decode_with(buf, self.config.bounds_check, self)
    }

    /// A reader over `buf` with the configured mode and limits.
    pub fn reader(&self, buf: Bytes) -> Reader<'_> {
        Reader::with_container(buf, self.config.bounds_check, self)
    }
}

impl fmt::Debug for CodecContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContainer")
            .field("config", &self.config)
            .field("codecs", &self.codecs.len())
            .field("layouts", &self.layouts.len())
            .field("types", &self.types)
            .finish()
    }
}

const BUILTIN_EXCEPTIONS: &[&str] = &[
    "System.ArgumentException",
    "System.ArgumentNullException",
    "System.ArgumentOutOfRangeException",
    "System.InvalidOperationException",
    "System.NotSupportedException",
    "System.NotImplementedException",
    "System.NullReferenceException",
    "System.IndexOutOfRangeException",
    "System.FormatException",
    "System.OverflowException",
    "System.DivideByZeroException",
    "System.TimeoutException",
    "System.OperationCanceledException",
    "System.UnauthorizedAccessException",
    "System.Collections.Generic.KeyNotFoundException",
    "System.IO.IOException",
];

fn register_builtins(container: &CodecContainer) {
    fn check(name: &str, result: Result<TypeRef>) {
        if let Err(err) = result {
            warn!("failed to register builtin type {}: {}", name, err);
        }
    }

    macro_rules! builtin {
        ($($ty:ty => $name:literal),* $(,)?) => {
            $(check($name, container.register::<$ty>($name));)*
        };
    }

    builtin! {
        bool => "System.Boolean",
        u8 => "System.Byte",
        i8 => "System.SByte",
        i16 => "System.Int16",
        u16 => "System.UInt16",
        i32 => "System.Int32",
        u32 => "System.UInt32",
        i64 => "System.Int64",
        u64 => "System.UInt64",
        f32 => "System.Single",
        f64 => "System.Double",
        char => "System.Char",
        String => "System.String",
        i128 => "System.Int128",
        u128 => "System.UInt128",
        () => "System.Void",
        Dynamic => "System.Object",
        TypeRef => "System.Type",
        Vec<u8> => "System.Byte[]",
        Vec<bool> => "System.Boolean[]",
        Vec<i32> => "System.Int32[]",
        Vec<i64> => "System.Int64[]",
        Vec<f64> => "System.Double[]",
        Vec<String> => "System.String[]",
        Vec<Dynamic> => "System.Object[]",
    }

    check(
        exception::GENERIC_EXCEPTION,
        container.register_type(TypeInfo::of::<ExceptionData>(exception::GENERIC_EXCEPTION).exception()),
    );
    for &name in BUILTIN_EXCEPTIONS {
        check(name, container.register_type(TypeInfo::named(name).exception()));
    }

    features::register_builtins(container);
}
