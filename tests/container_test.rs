use rpcwire::exception::{GENERIC_EXCEPTION, NETWORK_SEPARATOR};
use rpcwire::reflection::TypeInfo;
use rpcwire::{
    decode, encode, CodecContainer, CodecKind, ContainerConfig, Decode, Dynamic, Encode,
    EncoderError, ExceptionData, TypeRef,
};
use bytes::Bytes;
use std::sync::Arc;
use std::thread;

#[derive(Encode, Decode, Debug, PartialEq, Clone)]
struct Account {
    id: u64,
    owner: String,
}

#[test]
fn test_codec_is_cached() {
    let container = CodecContainer::new(ContainerConfig::default());
    let first = container.codec_for::<Account>();
    let second = container.codec_for::<Account>();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.info().kind, CodecKind::Structural);
}

#[test]
fn test_concurrent_codec_creation_yields_one_codec() {
    let container = Arc::new(CodecContainer::new(ContainerConfig::default()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = Arc::clone(&container);
            thread::spawn(move || container.codec_for::<Vec<Account>>())
        })
        .collect();
    let codecs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for codec in &codecs[1..] {
        assert!(Arc::ptr_eq(&codecs[0], codec));
    }
}

#[test]
fn test_builtin_names() {
    let types = CodecContainer::global().types();
    assert_eq!(types.type_ref_of::<i32>().unwrap().name(), "System.Int32");
    assert_eq!(types.type_ref_of::<String>().unwrap().name(), "System.String");
    assert!(types.contains("System.Int32[]"));
    assert!(types.contains("System.String[][]"));
    assert!(!types.contains("Nope.Missing"));
}

#[test]
fn test_dynamic_roundtrip_through_registered_type() {
    let container = CodecContainer::new(ContainerConfig::default());
    container.register::<Account>("Bank.Account").unwrap();

    let account = Account {
        id: 1,
        owner: "ann".to_string(),
    };
    let value = Dynamic::new_in(&container, account.clone()).unwrap();
    assert_eq!(value.type_ref().unwrap().name(), "Bank.Account");

    let mut buf = container.encode(&value).unwrap();
    let decoded: Dynamic = container.decode(&mut buf).unwrap();
    assert_eq!(decoded.downcast_ref::<Account>(), Some(&account));
    assert_eq!(decoded, value);
}

#[test]
fn test_dynamic_unknown_name_fails() {
    let container = CodecContainer::new(ContainerConfig::default());
    container.register::<Account>("Bank.Account").unwrap();
    let value = Dynamic::new_in(&container, Account { id: 1, owner: String::new() }).unwrap();
    let mut buf = encode(&value).unwrap();

    // The global container never heard of Bank.Account.
    assert!(matches!(
        decode::<Dynamic>(&mut buf),
        Err(EncoderError::Resolution(_))
    ));
}

#[test]
fn test_dynamic_in_collections() {
    let values = vec![Dynamic::from(1i32), Dynamic::null(), Dynamic::from("two")];
    let mut buf = encode(&values).unwrap();
    let decoded: Vec<Dynamic> = decode(&mut buf).unwrap();
    assert_eq!(decoded, values);
    assert_eq!(decoded[2].downcast_ref::<String>().map(String::as_str), Some("two"));
}

#[test]
fn test_conflicting_registration() {
    let container = CodecContainer::new(ContainerConfig::default());
    container.register::<Account>("Bank.Account").unwrap();
    assert!(container.register::<Account>("Bank.Account").is_ok());
    assert!(matches!(
        container.register::<u8>("Bank.Account"),
        Err(EncoderError::Registration(_))
    ));
}

#[test]
fn test_empty_container_knows_nothing() {
    let container = CodecContainer::empty(ContainerConfig::default());
    assert!(container.types().is_empty());
    let mut buf = encode(&TypeRef::new("System.Int32")).unwrap();
    assert!(matches!(
        container.decode::<TypeRef>(&mut buf),
        Err(EncoderError::Resolution(_))
    ));
}

#[test]
fn test_exception_roundtrip_wraps_stack_trace() {
    let error = ExceptionData::new("System.ArgumentException", "bad id")
        .with_stack_trace("at Bank.Open()")
        .with_inner(ExceptionData::generic("root cause"));
    let mut buf = encode(&error).unwrap();
    let decoded: ExceptionData = decode(&mut buf).unwrap();

    assert_eq!(decoded.type_name, "System.ArgumentException");
    assert_eq!(decoded.message, "bad id");
    let inner = decoded.inner.unwrap();
    assert_eq!(inner.type_name, GENERIC_EXCEPTION);
    assert_eq!(
        inner.message,
        format!("root cause{}at Bank.Open()", NETWORK_SEPARATOR)
    );
}

#[test]
fn test_unknown_exception_becomes_generic() {
    let error = ExceptionData::new("Bank.OverdraftException", "too low");
    let mut buf = encode(&error).unwrap();
    let decoded: ExceptionData = decode(&mut buf).unwrap();
    assert_eq!(decoded.type_name, GENERIC_EXCEPTION);
    assert_eq!(decoded.message, "too low");
    assert!(decoded.inner.is_none());
}

#[test]
fn test_registered_exception_keeps_name() {
    let container = CodecContainer::new(ContainerConfig::default());
    container
        .register_type(TypeInfo::named("Bank.OverdraftException").exception())
        .unwrap();
    let error = ExceptionData::new("Bank.OverdraftException", "too low");
    let mut buf = encode(&error).unwrap();
    let decoded: ExceptionData = container.decode(&mut buf).unwrap();
    assert_eq!(decoded.type_name, "Bank.OverdraftException");
}

#[test]
fn test_null_exception() {
    let buf = encode(&None::<ExceptionData>).unwrap();
    assert_eq!(&buf[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
}

fn nested_objects(levels: usize) -> Bytes {
    let name = encode("System.Object").unwrap();
    let mut data = Vec::with_capacity(levels * name.len() + 4);
    for _ in 0..levels {
        data.extend_from_slice(&name);
    }
    data.extend_from_slice(&(-1i32).to_le_bytes());
    Bytes::from(data)
}

#[test]
fn test_nested_dynamic_values_hit_depth_limit() {
    let mut shallow = nested_objects(10);
    let mut value: Dynamic = decode(&mut shallow).unwrap();
    for _ in 0..10 {
        assert_eq!(value.type_ref().unwrap().name(), "System.Object");
        value = value.downcast_ref::<Dynamic>().unwrap().clone();
    }
    assert!(value.is_null());

    let mut deep = nested_objects(20_000);
    assert!(matches!(
        decode::<Dynamic>(&mut deep),
        Err(EncoderError::Corrupt { .. })
    ));

    let strict = CodecContainer::new(ContainerConfig::default().with_max_depth(4));
    let mut buf = nested_objects(10);
    assert!(matches!(
        strict.decode::<Dynamic>(&mut buf),
        Err(EncoderError::Corrupt { .. })
    ));
}

#[test]
fn test_metadata_reregistration_keeps_codec() {
    let container = CodecContainer::new(ContainerConfig::default());
    container
        .register_type(
            TypeInfo::named("System.Int32").static_method("Parse", &["System.String"], "System.Int32"),
        )
        .unwrap();

    let info = container.types().get("System.Int32").unwrap();
    assert!(info.method_named("Parse").is_some());
    assert!(container.codec_by_name("System.Int32").is_ok());
    assert_eq!(
        container.types().type_ref_of::<i32>().unwrap().name(),
        "System.Int32"
    );

    let mut buf = container.encode(&Dynamic::from(5i32)).unwrap();
    let decoded: Dynamic = container.decode(&mut buf).unwrap();
    assert_eq!(decoded.downcast_ref::<i32>(), Some(&5));
}
