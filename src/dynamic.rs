use crate::container::WireValue;
use crate::reflection::TypeRef;
use crate::*;
use bytes::{BufMut, BytesMut};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A value whose concrete type is only known at run time.
///
/// Written as the registered name of the runtime type (`-1` for null),
/// followed by the value encoded with the codec registered for that name.
/// Decoding resolves the name through the reader's container.
#[derive(Clone, Default)]
pub struct Dynamic {
    inner: Option<(TypeRef, Arc<dyn WireValue>)>,
}

impl Dynamic {
    /// Wraps `value`, naming it by its registration in the global container.
    ///
    /// # Errors
    /// [`EncoderError::UnsupportedType`] if `T` was never registered.
    pub fn new<T: Wire>(value: T) -> Result<Self> {
        Self::new_in(CodecContainer::global(), value)
    }

    /// Wraps `value`, naming it by its registration in `container`.
    pub fn new_in<T: Wire>(container: &CodecContainer, value: T) -> Result<Self> {
        let ty = container
            .types()
            .type_ref_of::<T>()
            .ok_or_else(|| EncoderError::UnsupportedType(std::any::type_name::<T>().to_string()))?;
        Ok(Self::with_type(ty, value))
    }

    /// Wraps `value` under an explicit type name.
    pub fn with_type<T: Wire>(ty: TypeRef, value: T) -> Self {
        Self {
            inner: Some((ty, Arc::new(value))),
        }
    }

    pub fn null() -> Self {
        Self { inner: None }
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Name of the runtime type, `None` for null.
    pub fn type_ref(&self) -> Option<&TypeRef> {
        self.inner.as_ref().map(|(ty, _)| ty)
    }

    pub fn value(&self) -> Option<&dyn WireValue> {
        self.inner.as_ref().map(|(_, value)| value.as_ref())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value()?.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some((a_ty, a)), Some((b_ty, b))) => a_ty == b_ty && a.eq_value(b.as_ref()),
            _ => false,
        }
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Dynamic(null)"),
            Some((ty, value)) => {
                write!(f, "Dynamic({}: ", ty)?;
                value.fmt_value(f)?;
                f.write_str(")")
            }
        }
    }
}

/// `Dynamic` has its own null state, so `Option<Dynamic>` uses a presence flag.
impl Encoder for Dynamic {
    const KIND: CodecKind = CodecKind::Indirect;

    fn calculate_size(&self) -> usize {
        match &self.inner {
            None => 4,
            Some((ty, value)) => ty.calculate_size() + value.erased_size(),
        }
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        match &self.inner {
            None => {
                writer.put_i32_le(cursor::NULL_LENGTH);
                Ok(())
            }
            Some((ty, value)) => {
                ty.encode(writer)?;
                value.erased_encode(writer)
            }
        }
    }
}

impl Decoder for Dynamic {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let Some(ty) = Option::<TypeRef>::decode(reader)? else {
            return Ok(Self::null());
        };
        trace!("decoding dynamic value of type {}", ty);
        let codec = reader.container().codec_for_type(&ty)?;
        let value = reader.nested("dynamic value", |reader| codec.decode_value(reader))?;
        Ok(Self {
            inner: Some((ty, value)),
        })
    }
}

macro_rules! impl_from_builtin {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl From<$ty> for Dynamic {
                fn from(value: $ty) -> Self {
                    Dynamic::with_type(TypeRef::new($name), value)
                }
            }
        )*
    };
}

impl_from_builtin! {
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
}

impl From<&str> for Dynamic {
    fn from(value: &str) -> Self {
        Dynamic::from(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_four_bytes() {
        let encoded = crate::encode(&Dynamic::null()).unwrap();
        assert_eq!(&encoded[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
        let mut buf = encoded;
        assert!(crate::decode::<Dynamic>(&mut buf).unwrap().is_null());
    }

    #[test]
    fn test_equality_delegates_to_value() {
        assert_eq!(Dynamic::from(5i32), Dynamic::new(5i32).unwrap());
        assert_ne!(Dynamic::from(5i32), Dynamic::from(6i32));
        assert_ne!(Dynamic::from(5i32), Dynamic::from(5i64));
        assert_ne!(Dynamic::from(5i32), Dynamic::null());
    }

    #[test]
    fn test_unregistered_type() {
        #[derive(Debug, PartialEq, Encode, Decode)]
        struct Unregistered {
            x: u8,
        }
        assert!(matches!(
            Dynamic::new(Unregistered { x: 1 }),
            Err(EncoderError::UnsupportedType(_))
        ));
    }
}
