use std::io::Write;
use std::sync::Arc;
use typthon_marshal::host::{ClassKind, HostClass, HostDict};
use typthon_marshal::native::string::string_bytes;
use typthon_marshal::{
    Argument, DynamicType, ErrorKind, HostCallable, HostValue, InfoType, InterfaceInfo, MarshalConfig,
    Marshaller, ObjectModel, Transfer, TypeInfo, TypeSystem, TypeTag,
};

fn fixture_with(config: MarshalConfig) -> (Marshaller, Arc<ObjectModel>) {
    let types = Arc::new(TypeSystem::new());
    let model = Arc::new(ObjectModel::new(types.clone()));
    (Marshaller::new(types, model.clone(), config), model)
}

fn marshaller() -> Marshaller {
    fixture_with(MarshalConfig::default()).0
}

#[test]
fn test_bounds_are_inclusive() {
    let m = marshaller();
    let cases: [(TypeTag, i64, i64); 4] = [
        (TypeTag::Int8, -128, 127),
        (TypeTag::UInt8, 0, 255),
        (TypeTag::Int16, -32768, 32767),
        (TypeTag::UInt16, 0, 65535),
    ];

    for (tag, lower, upper) in cases {
        let info = TypeInfo::new(tag);
        m.check_value(&info, &HostValue::Int(lower)).unwrap();
        m.check_value(&info, &HostValue::Int(upper)).unwrap();

        let expected = format!("Must range from {} to {}", lower, upper);
        for outside in [lower - 1, upper + 1] {
            let err = m.check_value(&info, &HostValue::Int(outside)).unwrap_err();
            assert_eq!(err.to_string(), expected);
            assert_eq!(err.kind().host_exception_name(), "ValueError");
        }
    }
}

#[test]
fn test_string_against_number_slot() {
    let m = marshaller();
    let hello = HostValue::str("hello");

    m.check_value(&TypeInfo::new(TypeTag::Utf8), &hello).unwrap();
    let err = m.check_value(&TypeInfo::new(TypeTag::Int32), &hello).unwrap_err();
    assert_eq!(err.to_string(), "Must be number, not str");
    assert_eq!(err.kind().host_exception_name(), "TypeError");
}

#[test]
fn test_type_mismatch_messages() {
    let m = marshaller();
    let cases = [
        (TypeInfo::new(TypeTag::Utf8), HostValue::Int(1), "Must be string, not int"),
        (
            TypeInfo::array(TypeInfo::new(TypeTag::Int32)),
            HostValue::Int(1),
            "Must be sequence, not int",
        ),
        (
            TypeInfo::ghash(TypeInfo::new(TypeTag::Utf8), TypeInfo::new(TypeTag::Int32)),
            HostValue::List(vec![]),
            "Must be mapping, not list",
        ),
        (
            TypeInfo::new(TypeTag::TimeT),
            HostValue::str("noon"),
            "Must be datetime.datetime, not str",
        ),
        (TypeInfo::new(TypeTag::GType), HostValue::None, "Must be gobject.GType, not NoneType"),
    ];

    for (info, value, message) in cases {
        assert_eq!(m.check_value(&info, &value).unwrap_err().to_string(), message);
    }
}

#[test]
fn test_fixed_size_array_length() {
    let m = marshaller();
    let info = TypeInfo::array(TypeInfo::new(TypeTag::UInt8)).with_fixed_size(4);
    let three = HostValue::Tuple(vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);

    let err = m.check_value(&info, &three).unwrap_err();
    assert_eq!(err.to_string(), "Must contain 4 items, not 3");

    let four = HostValue::Tuple((0..4).map(HostValue::Int).collect());
    m.check_value(&info, &four).unwrap();
}

#[test]
fn test_breadcrumbs_through_keys() {
    let m = marshaller();
    let info = TypeInfo::glist(TypeInfo::ghash(TypeInfo::new(TypeTag::Int32), TypeInfo::new(TypeTag::Utf8)));
    let mut dict = HostDict::new();
    dict.insert(HostValue::str("not a key"), HostValue::str("v"));
    let value = HostValue::List(vec![HostValue::Dict(dict)]);

    let err = m.check_value(&info, &value).unwrap_err();
    assert_eq!(err.to_string(), "Item 0: Key 0: Must be number, not str");
    assert_eq!(err.path().len(), 2);
}

#[test]
fn test_callback_and_instance_checks() {
    let (m, model) = fixture_with(MarshalConfig::default());

    let signature = typthon_marshal::CallableInfo::builder("Test", "Func").build();
    let callback = TypeInfo::interface(InterfaceInfo::callback(signature));
    let callable = HostValue::Callable(HostCallable::new("f", |_: &[HostValue]| Ok(HostValue::None)));
    m.check_value(&callback, &callable).unwrap();
    assert_eq!(
        m.check_value(&callback, &HostValue::Int(1)).unwrap_err().to_string(),
        "Must be callable, not int"
    );

    let ty = m.types().register_object("TestButton", DynamicType::OBJECT).unwrap();
    model
        .registry()
        .register(HostClass::new("Test.Button", ClassKind::Object, ty));
    let info = TypeInfo::interface(InterfaceInfo::new(InfoType::Object, "Test", "Button", ty));
    assert_eq!(
        m.check_value(&info, &HostValue::str("button")).unwrap_err().to_string(),
        "Must be Test.Button, not str"
    );
}

#[test]
fn test_union_and_error_unsupported() {
    let m = marshaller();
    let union = TypeInfo::interface(InterfaceInfo::new(InfoType::Union, "Test", "U", DynamicType::NONE));
    let err = m.check_value(&union, &HostValue::None).unwrap_err();
    assert_eq!(err.to_string(), "union marshalling is not supported yet");
    assert_eq!(err.kind().host_exception_name(), "NotImplementedError");

    let err = m.check_value(&TypeInfo::new(TypeTag::Error), &HostValue::None).unwrap_err();
    assert_eq!(err.to_string(), "Error marshalling is not supported yet");
}

#[test]
fn test_latin1_filenames_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[filenames]\nencoding = \"latin-1\"").unwrap();
    let config = MarshalConfig::load(file.path()).unwrap();
    let (m, _) = fixture_with(config);

    let info = TypeInfo::new(TypeTag::Filename);
    let value = HostValue::str("caf\u{e9}");
    let arg = m.to_native(&value, &info, Transfer::Nothing).unwrap();
    match arg {
        Argument::String(p) => assert_eq!(unsafe { string_bytes(p) }, b"caf\xe9"),
        other => panic!("unexpected slot {:?}", other),
    }
    assert_eq!(unsafe { m.to_host(arg, &info, Transfer::Nothing) }.unwrap(), value);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MarshalConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Config(_)));
}
