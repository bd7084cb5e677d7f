//! `extends_builtin` lets a custom type also present as a built-in container
//! shape: the built-in packet rides along as an extra, untagged supertype
//! packet, while the type's own registered write still supplies the OBJECT's
//! final payload. Also covers null erasure on the polymorphic entry point,
//! which has no wrapper tag of its own.

use wiretype::{BuiltinData, BuiltinView, Deserializer, NoOpaqueCodec, Poly, Schema, Serializer, TypeFlag};

struct Item {
    n: i32,
}

struct Wrapped {
    items: Vec<Item>,
    label: String,
}

impl BuiltinView for Wrapped {
    fn builtin_view(&self) -> BuiltinData<'_> {
        BuiltinData::List(self.items.iter().map(|i| i as &dyn Poly).collect())
    }
}

fn schema_with_wrapped() -> Schema {
    let mut builder = Schema::builder();
    builder.define::<Item>().unwrap().write(|i, ser| ser.write_int(i.n)).unwrap().read(|de| Ok(Item { n: de.read_int()? })).unwrap();
    builder
        .define::<Wrapped>()
        .unwrap()
        .extends_builtin()
        .write(|w, ser| ser.write_str(&w.label))
        .unwrap()
        .read(|de| {
            let (flag, bytes) = de.builtin_supertype_bytes().expect("builtin supertype packet present");
            assert_eq!(flag, TypeFlag::List);
            let bytes = bytes.to_vec();
            let mut view: &[u8] = bytes.as_slice();
            let mut inner = Deserializer::new(&mut view, de.schema(), de.opaque_codec());
            let items = inner.read_list(|d| {
                let boxed = d.read_poly()?.expect("non-null item");
                Ok(*boxed.downcast::<Item>().expect("Item"))
            })?;
            let label = de.read_str()?;
            Ok(Wrapped { items, label })
        })
        .unwrap();
    builder.finalize().unwrap()
}

#[test]
fn builtin_supertype_packet_rides_alongside_the_types_own_write() {
    let schema = schema_with_wrapped();
    let value = Wrapped { items: vec![Item { n: 1 }, Item { n: 2 }], label: "wrapped".to_string() };

    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &schema, &NoOpaqueCodec);
        ser.write_poly(&value as &dyn Poly).unwrap();
    }

    // OBJECT "Wrapped" 01
    //   LIST 2 [OBJECT "Item" 00 INT 1 END_OBJECT] [OBJECT "Item" 00 INT 2 END_OBJECT]
    //   STRING "wrapped"
    // END_OBJECT
    assert_eq!(buf[0], TypeFlag::Object.as_byte());
    // superCount sits right after the length-prefixed name; decode it
    // generically instead of hardcoding the name's byte length.
    let name_len = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
    let super_count_index = 5 + name_len;
    assert_eq!(buf[super_count_index], 1, "one untagged builtin-as-super packet");
    assert_eq!(buf[super_count_index + 1], TypeFlag::List.as_byte(), "builtin packet carries no OBJECT framing");

    let mut slice = buf.as_slice();
    let mut de = Deserializer::new(&mut slice, &schema, &NoOpaqueCodec);
    let boxed = de.read_poly().unwrap().expect("non-null");
    let decoded = boxed.downcast::<Wrapped>().expect("Wrapped");
    assert_eq!(decoded.items.len(), 2);
    assert_eq!(decoded.items[0].n, 1);
    assert_eq!(decoded.items[1].n, 2);
    assert_eq!(decoded.label, "wrapped");
    assert!(slice.is_empty());
}

#[test]
fn write_poly_opt_erases_none_to_a_bare_null_byte() {
    let schema = schema_with_wrapped();
    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &schema, &NoOpaqueCodec);
        ser.write_poly_opt(None).unwrap();
    }
    assert_eq!(buf, vec![TypeFlag::Null.as_byte()]);

    let mut slice = buf.as_slice();
    let mut de = Deserializer::new(&mut slice, &schema, &NoOpaqueCodec);
    assert!(de.read_poly().unwrap().is_none());
    assert!(slice.is_empty());
}
