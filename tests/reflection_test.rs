use rpcwire::reflection::TypeInfo;
use rpcwire::{
    decode, encode, CodecContainer, ConstructorInfo, ContainerConfig, Encoder, EncoderError, MemberInfo,
    MemberKind, MethodInfo, ResolutionError, TypeRef,
};
use std::sync::Arc;

const LEDGER: &str = "Accounting.Ledger";

fn ledger() -> Arc<TypeInfo> {
    let types = CodecContainer::global().types();
    if let Some(info) = types.get(LEDGER) {
        return info;
    }
    CodecContainer::global()
        .register_type(
            TypeInfo::named(LEDGER)
                .method("Post", &["System.String", "System.Int64"], "System.Boolean")
                .method("Post", &["System.String"], "System.Boolean")
                .static_method("Open", &["System.String"], LEDGER)
                .generic_method("Find", 1, &["!!0"], "!!0")
                .field("entries", "System.Int64[]")
                .property("Balance", "System.Int64")
                .static_property("Current", LEDGER)
                .indexer(&["System.Int32"], "System.Int64")
                .constructor(&[])
                .constructor(&["System.String"]),
        )
        .unwrap();
    types.get(LEDGER).unwrap()
}

fn roundtrip<T: rpcwire::Encoder + rpcwire::Decoder>(value: &T) -> T {
    let mut buf = encode(value).unwrap();
    assert_eq!(buf.len(), value.calculate_size());
    let decoded = decode(&mut buf).unwrap();
    assert!(buf.is_empty());
    decoded
}

#[test]
fn test_type_ref_wire_form() {
    let ty = TypeRef::new("System.Int32");
    assert_eq!(encode(&ty).unwrap(), encode("System.Int32").unwrap());
    assert_eq!(roundtrip(&ty), ty);
    assert_eq!(roundtrip(&ty.array_of()).name(), "System.Int32[]");
    assert_eq!(roundtrip(&None::<TypeRef>), None);
}

#[test]
fn test_unknown_type_fails() {
    let mut buf = encode(&TypeRef::new("Accounting.Missing")).unwrap();
    assert!(matches!(
        decode::<TypeRef>(&mut buf),
        Err(EncoderError::Resolution(ResolutionError::UnknownType(name))) if name == "Accounting.Missing"
    ));
}

#[test]
fn test_overloads_resolve_by_signature() {
    let info = ledger();
    let overloads: Vec<&MethodInfo> = info.methods().iter().filter(|m| m.name == "Post").collect();
    assert_eq!(overloads.len(), 2);
    for method in overloads {
        assert_eq!(&roundtrip(method), method);
    }
}

#[test]
fn test_static_method_roundtrip() {
    let info = ledger();
    let open = info.method_named("Open").unwrap();
    let decoded = roundtrip(open);
    assert!(decoded.is_static);
    assert_eq!(decoded.return_type.name(), LEDGER);
}

#[test]
fn test_generic_method_roundtrip() {
    let info = ledger();
    let definition = info.method_named("Find").unwrap();
    assert!(definition.is_generic_definition());
    assert!(definition.make_generic(vec![]).is_none());

    let closed = definition
        .make_generic(vec![TypeRef::new("System.String")])
        .unwrap();
    assert_eq!(
        closed.resolved_parameter_types(),
        vec![TypeRef::new("System.String")]
    );
    let decoded = roundtrip(&closed);
    assert_eq!(decoded, closed);
    assert!(!decoded.is_generic_definition());
}

#[test]
fn test_generic_definition_roundtrip() {
    let info = ledger();
    let definition = info.method_named("Find").unwrap();
    let buf = encode(definition).unwrap();
    assert_eq!(buf.len(), definition.calculate_size());

    let mut reader = buf;
    let decoded: MethodInfo = decode(&mut reader).unwrap();
    assert_eq!(&decoded, definition);
    assert!(decoded.is_generic_definition());
    assert_eq!(decoded.generic_arity, 1);
}

#[test]
fn test_definition_writes_its_generic_parameters() {
    let info = ledger();
    let definition = info.method_named("Find").unwrap();
    let closed_over_parameter = definition
        .make_generic(vec![TypeRef::generic_parameter(0)])
        .unwrap();
    assert_eq!(
        encode(definition).unwrap(),
        encode(&closed_over_parameter).unwrap()
    );
}

#[test]
fn test_missing_method_fails() {
    let info = ledger();
    let mut forged = info.method_named("Open").unwrap().clone();
    forged.parameter_types = vec![TypeRef::new("System.Int32")];
    let mut buf = encode(&forged).unwrap();
    assert!(matches!(
        decode::<MethodInfo>(&mut buf),
        Err(EncoderError::Resolution(ResolutionError::MethodNotFound { .. }))
    ));
}

#[test]
fn test_members_roundtrip() {
    let info = ledger();
    for member in info.members() {
        assert_eq!(&roundtrip(member), member);
    }
    let indexer = info.member_named("Item").unwrap();
    assert!(indexer.is_indexer());
    assert_eq!(indexer.kind, MemberKind::Property);
    assert_eq!(info.member_named("entries").unwrap().kind, MemberKind::Field);
}

#[test]
fn test_member_kind_must_match() {
    let info = ledger();
    let mut forged: MemberInfo = info.member_named("Balance").unwrap().clone();
    forged.kind = MemberKind::Field;
    let mut buf = encode(&forged).unwrap();
    assert!(matches!(
        decode::<MemberInfo>(&mut buf),
        Err(EncoderError::Resolution(ResolutionError::MemberNotFound { .. }))
    ));
}

#[test]
fn test_constructors_roundtrip() {
    let info = ledger();
    let by_name = info.constructor_with(&["System.String"]).unwrap();
    assert_eq!(&roundtrip(by_name), by_name);

    let missing = ConstructorInfo {
        declaring_type: TypeRef::new(LEDGER),
        parameter_types: vec![TypeRef::new("System.Int32")],
    };
    let mut buf = encode(&missing).unwrap();
    assert!(matches!(
        decode::<ConstructorInfo>(&mut buf),
        Err(EncoderError::Resolution(ResolutionError::ConstructorNotFound { .. }))
    ));
}

#[test]
fn test_metadata_resolves_per_container() {
    let info = ledger();
    let open = info.method_named("Open").unwrap();
    let mut buf = encode(open).unwrap();
    let other = CodecContainer::new(ContainerConfig::default());
    assert!(other.decode::<MethodInfo>(&mut buf).is_err());
}
