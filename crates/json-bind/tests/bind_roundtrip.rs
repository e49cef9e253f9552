//! End-to-end typed decode and encode through a `Binder`.

use json_bind::{BindError, Binder, Converter, Native, RecordLayout, Spec, TypeKey, Value};

#[derive(Debug, Clone, PartialEq)]
enum Policy {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, PartialEq)]
struct Owner {
    name: String,
    active: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Contract {
    id: i32,
    policy: Policy,
    tags: Vec<String>,
    owner: Owner,
}

fn binder() -> Binder {
    let mut binder = Binder::new();
    // Contract references Owner and Policy before they are registered;
    // bound members resolve lazily, so declaration order is free.
    binder.register_record(
        RecordLayout::new("Contract")
            .value_field::<i32, _>("id", |c: &Contract| c.id)
            .bound_field::<Policy, _>("policy", |c: &Contract| c.policy.clone())
            .seq_field::<String, _>("tags", |c: &Contract| c.tags.clone())
            .bound_field::<Owner, _>("owner", |c: &Contract| c.owner.clone())
            .construct(|slots| {
                Ok(Contract {
                    id: slots.take("id")?,
                    policy: slots.take("policy")?,
                    tags: slots.take("tags")?,
                    owner: slots.take("owner")?,
                })
            }),
    );
    binder.register_record(
        RecordLayout::new("Owner")
            .value_field::<String, _>("name", |o: &Owner| o.name.clone())
            .value_field_or::<bool, _>("active", true, |o: &Owner| o.active)
            .construct(|slots| {
                Ok(Owner {
                    name: slots.take("name")?,
                    active: slots.take("active")?,
                })
            }),
    );
    binder.register_enum(
        "Policy",
        vec![("strict", Policy::Strict), ("lenient", Policy::Lenient)],
    );
    binder
}

fn sample() -> Contract {
    Contract {
        id: 7,
        policy: Policy::Strict,
        tags: vec!["a".to_string(), "b".to_string()],
        owner: Owner {
            name: "ada".to_string(),
            active: true,
        },
    }
}

const SAMPLE_TEXT: &str =
    r#"{"id":7,"policy":"strict","tags":["a","b"],"owner":{"name":"ada","active":true}}"#;

#[test]
fn nested_record_round_trips() {
    let binder = binder();
    let contract: Contract = binder.read(SAMPLE_TEXT).unwrap();
    assert_eq!(contract, sample());
    assert_eq!(binder.write(&contract).unwrap(), SAMPLE_TEXT);
}

#[test]
fn whitespace_and_member_order_do_not_matter_for_decode() {
    let binder = binder();
    let contract: Contract = binder
        .read(
            r#"{
                "owner": { "active": true, "name": "ada" },
                "tags": ["a", "b"],
                "policy": "strict",
                "id": 7
            }"#,
        )
        .unwrap();
    assert_eq!(contract, sample());
}

#[test]
fn enum_values_read_and_write_as_strings() {
    let binder = binder();
    let policy: Policy = binder.read(r#""lenient""#).unwrap();
    assert_eq!(policy, Policy::Lenient);
    assert_eq!(binder.write(&Policy::Strict).unwrap(), r#""strict""#);
}

#[test]
fn unknown_enum_constant_is_rejected() {
    let binder = binder();
    let err = binder.read::<Policy>(r#""loose""#).unwrap_err();
    assert!(matches!(
        err,
        BindError::UnknownEnumConstant { ref value, .. } if value == "loose"
    ));
}

#[test]
fn non_string_enum_values_are_a_type_mismatch() {
    let binder = binder();
    let err = binder.read::<Policy>("3").unwrap_err();
    assert!(matches!(
        err,
        BindError::TypeMismatch {
            expected: "string",
            ..
        }
    ));
}

#[test]
fn defaults_apply_and_required_members_are_enforced() {
    let binder = binder();
    let owner: Owner = binder.read(r#"{ "name": "bob" }"#).unwrap();
    assert_eq!(
        owner,
        Owner {
            name: "bob".to_string(),
            active: true
        }
    );
    let err = binder.read::<Owner>(r#"{ "active": false }"#).unwrap_err();
    assert!(matches!(
        err,
        BindError::MissingRequiredMember { ref member, .. } if member == "name"
    ));
}

#[test]
fn unknown_members_are_rejected() {
    let binder = binder();
    let err = binder
        .read::<Owner>(r#"{ "name": "bob", "color": "red" }"#)
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::UnknownMember { ref member, .. } if member == "color"
    ));
}

#[test]
fn unregistered_types_fail_to_resolve() {
    #[derive(Debug)]
    struct Unregistered;
    let binder = binder();
    let err = binder.read::<Unregistered>("{}").unwrap_err();
    assert!(matches!(err, BindError::UnresolvedType(_)));
}

#[test]
fn read_rejects_array_and_stream_shaped_specs() {
    let binder = Binder::new();
    // Array and stream documents have their own entry points; `read` only
    // accepts object- and value-shaped specs.
    let array_spec = Spec::scalar::<i32>().array();
    let err = binder.read_as::<Vec<i32>>("[1, 2]", &array_spec).unwrap_err();
    assert!(matches!(err, BindError::InvalidSpecShape { .. }));

    let stream_spec = Spec::scalar::<i32>().stream(
        |elements: &mut dyn Iterator<Item = Result<Native, BindError>>| {
            elements.count();
            Ok(Box::new(0_i32) as Native)
        },
    );
    let err = binder.read_as::<i32>("[1, 2]", &stream_spec).unwrap_err();
    assert!(matches!(err, BindError::InvalidSpecShape { .. }));
}

#[test]
fn builtin_scalars_bind_without_registration() {
    let binder = Binder::new();
    assert_eq!(binder.read::<i32>("42").unwrap(), 42);
    assert_eq!(binder.read::<i64>("3000000000").unwrap(), 3_000_000_000);
    assert_eq!(binder.read::<bool>("true").unwrap(), true);
    assert_eq!(binder.read::<String>(r#""hi""#).unwrap(), "hi");
    assert_eq!(binder.write(&1.5_f64).unwrap(), "1.5");
    assert_eq!(binder.read_array::<i32>("[1, 2, 3]").unwrap(), vec![1, 2, 3]);
}

#[test]
fn self_referential_records_are_detected() {
    #[derive(Debug, Clone, PartialEq)]
    struct Node {
        next: Box<Node>,
    }
    let mut binder = Binder::new();
    binder.register_record(
        RecordLayout::new("Node")
            .bound_field::<Node, _>("next", |n: &Node| (*n.next).clone())
            .construct(|slots| {
                Ok(Node {
                    next: Box::new(slots.take("next")?),
                })
            }),
    );
    let err = binder.resolve(TypeKey::of::<Node>()).unwrap_err();
    assert!(matches!(err, BindError::CyclicType(_)));
}

#[test]
fn converter_fields_round_trip_through_both_directions() {
    // JSON carries cents, the native value carries whole units.
    #[derive(Debug, Clone, PartialEq)]
    struct Price {
        units: i32,
    }
    let cents = Converter::new(
        |v| match v {
            Value::I32(c) => Ok(Value::I32(c / 100)),
            other => Ok(other),
        },
        |v| match v {
            Value::I32(u) => Ok(Value::I32(u * 100)),
            other => Ok(other),
        },
    );
    let mut binder = Binder::new();
    binder.register_record(
        RecordLayout::new("Price")
            .convert_field::<i32, _>("amount", cents, |p: &Price| p.units)
            .construct(|slots| {
                Ok(Price {
                    units: slots.take("amount")?,
                })
            }),
    );
    let price: Price = binder.read(r#"{ "amount": 1200 }"#).unwrap();
    assert_eq!(price, Price { units: 12 });
    assert_eq!(binder.write(&price).unwrap(), r#"{"amount":1200}"#);
}

#[test]
fn prepended_finders_override_builtin_scalars() {
    let mut binder = Binder::new();
    binder.prepend_finder(|key: TypeKey, _binder: &Binder| -> Result<Option<Spec>, BindError> {
        if key == TypeKey::of::<i32>() {
            let shifted = Spec::scalar::<i32>().convert_with(Converter::new(
                |v| match v {
                    Value::I32(i) => Ok(Value::I32(i + 1)),
                    other => Ok(other),
                },
                |v| match v {
                    Value::I32(i) => Ok(Value::I32(i - 1)),
                    other => Ok(other),
                },
            ))?;
            return Ok(Some(shifted));
        }
        Ok(None)
    });
    assert_eq!(binder.read::<i32>("41").unwrap(), 42);
}

#[test]
fn filtered_spec_skips_members_on_decode_and_refuses_replay() {
    let binder = binder();
    let spec = binder.resolve(TypeKey::of::<Owner>()).unwrap();
    let filtered = spec.filter_with(|name| name != "active").unwrap();

    // The filtered member never reaches the layout; its default applies.
    let owner: Owner = binder
        .read_as(r#"{ "name": "eve", "active": false }"#, &filtered)
        .unwrap();
    assert_eq!(
        owner,
        Owner {
            name: "eve".to_string(),
            active: true
        }
    );

    let err = binder.write_as(&owner, &filtered).unwrap_err();
    assert!(matches!(err, BindError::FilteredSpecReplay(_)));
}

#[test]
fn filters_compose_by_conjunction() {
    let binder = binder();
    let spec = binder.resolve(TypeKey::of::<Owner>()).unwrap();
    let filtered = spec
        .filter_with(|name| name != "active")
        .unwrap()
        .filter_with(|name| name != "name")
        .unwrap();
    // Everything filtered out: name has no default, so finish fails.
    let err = binder
        .read_as::<Owner>(r#"{ "name": "eve", "active": false }"#, &filtered)
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::MissingRequiredMember { ref member, .. } if member == "name"
    ));
}

#[test]
fn record_arrays_round_trip_through_structural_replay() {
    #[derive(Debug, Clone, PartialEq)]
    struct Pref {
        policy: Policy,
    }
    let mut binder = binder();
    binder.register_record(
        RecordLayout::new("Pref")
            .bound_field::<Policy, _>("policy", |p: &Pref| p.policy.clone())
            .construct(|slots| {
                Ok(Pref {
                    policy: slots.take("policy")?,
                })
            }),
    );
    let text = r#"[{"policy":"strict"},{"policy":"lenient"}]"#;
    let prefs = binder.read_array::<Pref>(text).unwrap();
    assert_eq!(
        prefs,
        vec![
            Pref {
                policy: Policy::Strict
            },
            Pref {
                policy: Policy::Lenient
            }
        ]
    );
    // Sequences have no spec of their own; they replay structurally.
    let replay = json_bind::Replay::Seq(
        prefs.into_iter().map(json_bind::Replay::native).collect(),
    );
    assert_eq!(binder.write_replay(replay).unwrap(), text);
}

#[test]
fn bound_sequences_decode_elementwise() {
    #[derive(Debug, Clone, PartialEq)]
    struct Team {
        owners: Vec<Owner>,
    }
    let mut binder = binder();
    binder.register_record(
        RecordLayout::new("Team")
            .bound_seq_field::<Owner, _>("owners", |t: &Team| t.owners.clone())
            .construct(|slots| {
                Ok(Team {
                    owners: slots.take("owners")?,
                })
            }),
    );
    let text = r#"{"owners":[{"name":"ada","active":true},{"name":"bob","active":false}]}"#;
    let team: Team = binder.read(text).unwrap();
    assert_eq!(team.owners.len(), 2);
    assert_eq!(team.owners[1].name, "bob");
    assert_eq!(binder.write(&team).unwrap(), text);
}
