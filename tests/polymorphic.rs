//! Single-inheritance-with-composition polymorphic dispatch: supertype
//! packets, static-write exclusivity, and a fallback reader for an unknown
//! subtype.

use wiretype::{Deserializer, NoOpaqueCodec, Poly, Schema, Serializer};

struct Parent {
    label: String,
}

struct Sub {
    parent: Parent,
    label: String,
}

struct SubSub {
    sub: Sub,
    label: String,
}

fn schema_with_parent_sub_subsub() -> Schema {
    let mut builder = Schema::builder();
    builder.define::<Parent>().unwrap().write(|p, ser| ser.write_str(&p.label)).unwrap();
    builder
        .define::<Sub>()
        .unwrap()
        .extends::<Parent>(|s| &s.parent)
        .unwrap()
        .write(|s, ser| ser.write_str(&s.label))
        .unwrap();
    builder
        .define::<SubSub>()
        .unwrap()
        .extends::<Sub>(|s| &s.sub)
        .unwrap()
        .write(|s, ser| ser.write_str(&s.label))
        .unwrap()
        .read(|de| {
            // Neither Parent nor Sub registered a reader, so their fields are
            // pulled straight out of the captured ancestor packets.
            let parent_bytes = de.supertype_bytes::<Parent>().expect("Parent packet present").to_vec();
            let mut parent_view: &[u8] = parent_bytes.as_slice();
            let mut parent_de = Deserializer::new(&mut parent_view, de.schema(), de.opaque_codec());
            let parent_label = parent_de.read_str()?;

            let sub_bytes = de.supertype_bytes::<Sub>().expect("Sub packet present").to_vec();
            let mut sub_view: &[u8] = sub_bytes.as_slice();
            let mut sub_de = Deserializer::new(&mut sub_view, de.schema(), de.opaque_codec());
            let sub_label = sub_de.read_str()?;

            let own_label = de.read_str()?;
            Ok(SubSub {
                sub: Sub { parent: Parent { label: parent_label }, label: sub_label },
                label: own_label,
            })
        })
        .unwrap();
    builder.finalize().unwrap()
}

#[test]
fn subsub_packet_matches_the_literal_wire_layout() {
    let schema = schema_with_parent_sub_subsub();
    let value = SubSub {
        sub: Sub { parent: Parent { label: "parent".to_string() }, label: "subclass".to_string() },
        label: "subclass of subclass".to_string(),
    };

    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &schema, &NoOpaqueCodec);
        ser.write_poly(&value as &dyn Poly).unwrap();
    }

    // OBJECT "SubSub" 02
    //   OBJECT "Parent" 00 STRING "parent" END_OBJECT
    //   OBJECT "Sub" 00 STRING "subclass" END_OBJECT
    //   STRING "subclass of subclass"
    // END_OBJECT
    let mut expected = Vec::new();
    expected.push(wiretype::TypeFlag::Object.as_byte());
    write_name(&mut expected, std::any::type_name::<SubSub>());
    expected.push(2);

    expected.push(wiretype::TypeFlag::Object.as_byte());
    write_name(&mut expected, std::any::type_name::<Parent>());
    expected.push(0);
    expected.push(wiretype::TypeFlag::String.as_byte());
    write_string(&mut expected, "parent");
    expected.push(wiretype::TypeFlag::EndObject.as_byte());

    expected.push(wiretype::TypeFlag::Object.as_byte());
    write_name(&mut expected, std::any::type_name::<Sub>());
    expected.push(0);
    expected.push(wiretype::TypeFlag::String.as_byte());
    write_string(&mut expected, "subclass");
    expected.push(wiretype::TypeFlag::EndObject.as_byte());

    expected.push(wiretype::TypeFlag::String.as_byte());
    write_string(&mut expected, "subclass of subclass");
    expected.push(wiretype::TypeFlag::EndObject.as_byte());

    assert_eq!(buf, expected);
}

#[test]
fn subsub_reader_recovers_ancestor_fields_with_no_ancestor_readers() {
    let schema = schema_with_parent_sub_subsub();
    let value = SubSub {
        sub: Sub { parent: Parent { label: "parent".to_string() }, label: "subclass".to_string() },
        label: "subclass of subclass".to_string(),
    };

    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &schema, &NoOpaqueCodec);
        ser.write_poly(&value as &dyn Poly).unwrap();
    }

    let mut slice = buf.as_slice();
    let mut de = Deserializer::new(&mut slice, &schema, &NoOpaqueCodec);
    let boxed = de.read_poly().unwrap().expect("non-null");
    let decoded = boxed.downcast::<SubSub>().expect("SubSub");
    assert_eq!(decoded.sub.parent.label, "parent");
    assert_eq!(decoded.sub.label, "subclass");
    assert_eq!(decoded.label, "subclass of subclass");
    assert!(slice.is_empty());
}

/// A type a reader doesn't recognize falls back to the nearest ancestor with
/// a `fallback` reader, materializing a default value for it instead of
/// erroring.
struct Person {
    name: String,
}

struct UniquePerson {
    person: Person,
    nickname: String,
}

#[test]
fn fallback_reader_materializes_an_unrecognized_subtype() {
    let mut builder = Schema::builder();
    builder.define::<Person>().unwrap().write(|p, ser| ser.write_str(&p.name)).unwrap();
    builder
        .define::<UniquePerson>()
        .unwrap()
        .extends::<Person>(|u| &u.person)
        .unwrap()
        .write(|u, ser| ser.write_str(&u.nickname))
        .unwrap();
    let writer_schema = builder.finalize().unwrap();

    let value = UniquePerson { person: Person { name: "Ada".to_string() }, nickname: "the analyst".to_string() };
    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &writer_schema, &NoOpaqueCodec);
        ser.write_poly(&value as &dyn Poly).unwrap();
    }

    // A reader schema that knows `UniquePerson` exists (so the `OBJECT`
    // name resolves) but never registers a reader for it: Person's
    // `fallback` reader supplies the value instead. It consumes the own
    // payload from whatever position it is invoked at, so this only frames
    // cleanly because both types' own payload happens to be a single
    // string — that coincidence is exactly what "fallback" promises, not
    // more.
    let mut reader_builder = Schema::builder();
    reader_builder.define::<Person>().unwrap().fallback(|de| Ok(Person { name: de.read_str()? })).unwrap();
    reader_builder.define::<UniquePerson>().unwrap().extends::<Person>(|u| &u.person).unwrap();
    let reader_schema = reader_builder.finalize().unwrap();

    let mut slice = buf.as_slice();
    let mut de = Deserializer::new(&mut slice, &reader_schema, &NoOpaqueCodec);
    let boxed = de.read_poly().unwrap().expect("non-null");
    let person = boxed.downcast::<Person>().expect("Person, materialized via fallback");
    assert_eq!(person.name, "the analyst");
    assert!(slice.is_empty());
}

fn write_name(buf: &mut Vec<u8>, name: &str) {
    write_string(buf, name);
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}
