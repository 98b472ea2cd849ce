//! Shared fixtures: a hand-assembled descriptor pool and sample messages.
//!
//! The schema is built from raw descriptor protos so the tests carry no build
//! script or `.proto` compilation step. `bridge.test.Contact` exercises every
//! field shape the bridge distinguishes: scalars of several widths, a repeated
//! field, string-keyed maps, a nested message, an enum and an `Any` envelope.

use std::collections::HashMap;
use std::sync::OnceLock;

use prost::Message;
use prost_reflect::{
    DescriptorPool, DynamicMessage, FieldDescriptor, Kind, MapKey, ReflectMessage,
    Value as ProtoValue,
};
use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions,
};

use crate::SchemaRegistry;

/// Declared field count of `bridge.test.Contact`.
pub(crate) const CONTACT_FIELD_COUNT: usize = 12;

fn scalar(name: &str, number: i32, kind: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(kind as i32),
        ..Default::default()
    }
}

fn repeated(name: &str, number: i32, kind: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..scalar(name, number, kind)
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_owned()),
        ..scalar(name, number, Type::Message)
    }
}

fn map_field(name: &str, number: i32, entry_type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..message_field(name, number, entry_type_name)
    }
}

fn map_entry(name: &str, value_kind: Type) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_owned()),
        field: vec![scalar("key", 1, Type::String), scalar("value", 2, value_kind)],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn link(name: &str, next_type: Option<&str>, leaf: bool) -> DescriptorProto {
    let mut fields = Vec::new();
    if let Some(next_type) = next_type {
        fields.push(message_field("next", 1, next_type));
    }
    if leaf {
        fields.push(scalar("leaf", 1, Type::String));
    }
    if name == "L1" {
        fields.push(scalar("tag", 2, Type::String));
    }
    DescriptorProto {
        name: Some(name.to_owned()),
        field: fields,
        ..Default::default()
    }
}

fn any_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("google/protobuf/any.proto".to_owned()),
        package: Some("google.protobuf".to_owned()),
        syntax: Some("proto3".to_owned()),
        message_type: vec![DescriptorProto {
            name: Some("Any".to_owned()),
            field: vec![
                scalar("type_url", 1, Type::String),
                scalar("value", 2, Type::Bytes),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn bridge_test_file() -> FileDescriptorProto {
    let contact = DescriptorProto {
        name: Some("Contact".to_owned()),
        field: vec![
            scalar("name", 1, Type::String),
            scalar("id", 2, Type::Int32),
            repeated("emails", 3, Type::String),
            map_field("attributes", 4, ".bridge.test.Contact.AttributesEntry"),
            message_field("address", 5, ".bridge.test.Address"),
            message_field("extra", 6, ".google.protobuf.Any"),
            scalar("score", 7, Type::Float),
            FieldDescriptorProto {
                json_name: Some("createdMs".to_owned()),
                ..scalar("created_ms", 8, Type::Int64)
            },
            scalar("active", 9, Type::Bool),
            repeated("ratings", 10, Type::Int32),
            map_field("counters", 11, ".bridge.test.Contact.CountersEntry"),
            FieldDescriptorProto {
                type_name: Some(".bridge.test.Status".to_owned()),
                ..scalar("status", 12, Type::Enum)
            },
        ],
        nested_type: vec![
            map_entry("AttributesEntry", Type::String),
            map_entry("CountersEntry", Type::Int64),
        ],
        ..Default::default()
    };
    let address = DescriptorProto {
        name: Some("Address".to_owned()),
        field: vec![scalar("city", 1, Type::String), scalar("zip", 2, Type::String)],
        ..Default::default()
    };
    let payload = DescriptorProto {
        name: Some("Payload".to_owned()),
        field: vec![scalar("note", 1, Type::String)],
        ..Default::default()
    };
    let status = EnumDescriptorProto {
        name: Some("Status".to_owned()),
        value: vec![
            EnumValueDescriptorProto {
                name: Some("STATUS_UNKNOWN".to_owned()),
                number: Some(0),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("STATUS_ACTIVE".to_owned()),
                number: Some(1),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    FileDescriptorProto {
        name: Some("bridge_test.proto".to_owned()),
        package: Some("bridge.test".to_owned()),
        syntax: Some("proto3".to_owned()),
        dependency: vec!["google/protobuf/any.proto".to_owned()],
        message_type: vec![
            contact,
            address,
            payload,
            link("L1", Some(".bridge.test.L2"), false),
            link("L2", Some(".bridge.test.L3"), false),
            link("L3", Some(".bridge.test.L4"), false),
            link("L4", Some(".bridge.test.L5"), false),
            link("L5", None, true),
        ],
        enum_type: vec![status],
        ..Default::default()
    }
}

pub(crate) fn pool() -> DescriptorPool {
    // Shared instance: descriptor equality is pool-identity based, so every
    // fixture must hang off the same pool for messages to compare equal.
    static POOL: OnceLock<DescriptorPool> = OnceLock::new();
    POOL.get_or_init(|| {
        DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
            file: vec![any_file(), bridge_test_file()],
        })
        .unwrap()
    })
    .clone()
}

pub(crate) fn registry() -> SchemaRegistry {
    SchemaRegistry::new(pool())
}

fn new_message(full_name: &str) -> DynamicMessage {
    DynamicMessage::new(pool().get_message_by_name(full_name).unwrap())
}

/// A `bridge.test.Payload` with the given note.
pub(crate) fn payload(note: &str) -> DynamicMessage {
    let mut payload = new_message("bridge.test.Payload");
    payload.set_field_by_name("note", ProtoValue::String(note.to_owned()));
    payload
}

/// Packs a message into a `google.protobuf.Any` envelope under the
/// conventional `type.googleapis.com/` URL prefix.
pub(crate) fn pack_any(payload: &DynamicMessage) -> DynamicMessage {
    let mut any = new_message("google.protobuf.Any");
    any.set_field_by_name(
        "type_url",
        ProtoValue::String(format!(
            "type.googleapis.com/{}",
            payload.descriptor().full_name()
        )),
    );
    any.set_field_by_name("value", ProtoValue::Bytes(payload.encode_to_vec().into()));
    any
}

/// The canonical sample contact used across the tests.
pub(crate) fn contact() -> DynamicMessage {
    let mut contact = new_message("bridge.test.Contact");
    contact.set_field_by_name("name", ProtoValue::String("ada".to_owned()));
    contact.set_field_by_name("id", ProtoValue::I32(7));
    contact.set_field_by_name(
        "emails",
        ProtoValue::List(vec![
            ProtoValue::String("a@x.io".to_owned()),
            ProtoValue::String("b@x.io".to_owned()),
            ProtoValue::String("c@x.io".to_owned()),
        ]),
    );

    let mut attributes = HashMap::new();
    attributes.insert(
        MapKey::String("tier".to_owned()),
        ProtoValue::String("gold".to_owned()),
    );
    attributes.insert(
        MapKey::String("team".to_owned()),
        ProtoValue::String("alpha".to_owned()),
    );
    contact.set_field_by_name("attributes", ProtoValue::Map(attributes));

    let mut address = new_message("bridge.test.Address");
    address.set_field_by_name("city", ProtoValue::String("paris".to_owned()));
    address.set_field_by_name("zip", ProtoValue::String("75001".to_owned()));
    contact.set_field_by_name("address", ProtoValue::Message(address));

    contact.set_field_by_name("extra", ProtoValue::Message(pack_any(&payload("remember"))));
    contact.set_field_by_name("created_ms", ProtoValue::I64(1_700_000_000_000));

    let mut counters = HashMap::new();
    counters.insert(MapKey::String("visits".to_owned()), ProtoValue::I64(3));
    contact.set_field_by_name("counters", ProtoValue::Map(counters));

    contact.set_field_by_name("status", ProtoValue::EnumNumber(1));
    contact
}

pub(crate) fn contact_without_address() -> DynamicMessage {
    let mut contact = contact();
    let field = contact.descriptor().get_field_by_name("address").unwrap();
    contact.clear_field(&field);
    contact
}

/// The `attributes` field descriptor plus the given pairs rendered as typed
/// map-entry messages, the alternate wire shape of a map field.
pub(crate) fn attributes_as_entry_messages(
    pairs: &[(&str, &str)],
) -> (FieldDescriptor, Vec<ProtoValue>) {
    let descriptor = pool().get_message_by_name("bridge.test.Contact").unwrap();
    let field = descriptor.get_field_by_name("attributes").unwrap();
    let Kind::Message(entry) = field.kind() else {
        panic!("attributes must be a map field");
    };
    let entries = pairs
        .iter()
        .map(|(key, value)| {
            let mut message = DynamicMessage::new(entry.clone());
            message.set_field_by_name("key", ProtoValue::String((*key).to_owned()));
            message.set_field_by_name("value", ProtoValue::String((*value).to_owned()));
            ProtoValue::Message(message)
        })
        .collect();
    (field, entries)
}

/// A five-level `L1 -> .. -> L5` chain with `leaf = "deep"` at the bottom.
pub(crate) fn nested() -> DynamicMessage {
    let mut l5 = new_message("bridge.test.L5");
    l5.set_field_by_name("leaf", ProtoValue::String("deep".to_owned()));

    let mut cursor = ProtoValue::Message(l5);
    for name in ["bridge.test.L4", "bridge.test.L3", "bridge.test.L2"] {
        let mut level = new_message(name);
        level.set_field_by_name("next", cursor);
        cursor = ProtoValue::Message(level);
    }

    let mut l1 = new_message("bridge.test.L1");
    l1.set_field_by_name("next", cursor);
    l1.set_field_by_name("tag", ProtoValue::String("t1".to_owned()));
    l1
}
