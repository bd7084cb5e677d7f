//! A `static` writer emits exactly its own bytes inside the `OBJECT` framing:
//! `superCount` is always zero and no ancestor packets appear, regardless of
//! what the type extends.

use wiretype::{NoOpaqueCodec, Poly, Schema, Serializer, TypeFlag};

struct Phonebook {
    entries: Vec<String>,
}

#[test]
fn static_write_emits_no_supertype_packets() {
    let mut builder = Schema::builder();
    builder
        .define::<Phonebook>()
        .unwrap()
        .static_write(|pb, ser| ser.write_list(pb.entries.len(), |ser, i| ser.write_str(&pb.entries[i])))
        .unwrap();
    let schema = builder.finalize().unwrap();

    let value = Phonebook { entries: vec!["Ada".to_string(), "Grace".to_string()] };
    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &schema, &NoOpaqueCodec);
        ser.write_poly(&value as &dyn Poly).unwrap();
    }

    let mut expected = Vec::new();
    expected.push(TypeFlag::Object.as_byte());
    write_name(&mut expected, std::any::type_name::<Phonebook>());
    expected.push(0); // superCount: static writers never produce ancestor packets.
    expected.push(TypeFlag::List.as_byte());
    expected.extend_from_slice(&2i32.to_be_bytes());
    for name in ["Ada", "Grace"] {
        expected.push(TypeFlag::String.as_byte());
        write_name(&mut expected, name);
    }
    expected.push(TypeFlag::EndObject.as_byte());

    assert_eq!(buf, expected);
}

/// A subtype of a static writer is rejected at schema-build time, not
/// silently dropped or merged into the ancestor's bytes.
#[test]
fn a_static_ancestors_subtype_cannot_register_its_own_writer() {
    struct UnlistedEntry {
        book: Phonebook,
        #[allow(dead_code)]
        note: String,
    }

    let mut builder = Schema::builder();
    builder
        .define::<Phonebook>()
        .unwrap()
        .static_write(|pb, ser| ser.write_list(pb.entries.len(), |ser, i| ser.write_str(&pb.entries[i])))
        .unwrap();
    let err = builder
        .define::<UnlistedEntry>()
        .unwrap()
        .extends::<Phonebook>(|e| &e.book)
        .unwrap()
        .write(|e, ser| ser.write_str(&e.note))
        .unwrap_err();
    assert_eq!(err.kind(), wiretype::ErrorKind::MalformedProtocol);
}

fn write_name(buf: &mut Vec<u8>, name: &str) {
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
}
