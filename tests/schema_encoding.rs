//! A `Schema` can serialize its own protocol registry (name, static/fallback
//! flags, supertype name, reinstall key) and rebuild an equivalent schema
//! from those bytes plus a registry of reinstall functions.

use std::collections::HashMap;
use wiretype::{Deserializer, Opaque, OpaqueCodec, ReinstallFn, Result, Schema, SchemaBuilder, Serializer};

/// Stores the reinstall key as raw UTF-8 bytes behind the `FUNCTION` tag.
/// `NoOpaqueCodec` refuses every opaque value, so schema self-encoding (which
/// always routes its reinstall key through `Opaque`) needs a codec that
/// actually works.
struct KeyCodec;

impl OpaqueCodec for KeyCodec {
    fn encode(&self, value: &Opaque) -> Result<Vec<u8>> {
        let key = value.0.downcast_ref::<String>().expect("reinstall key is a String");
        Ok(key.clone().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Opaque> {
        let key = String::from_utf8(bytes.to_vec())
            .map_err(|e| wiretype::Error::new(wiretype::ErrorKind::TypeMismatch, format!("reinstall key is not valid UTF-8: {e}"), None))?;
        Ok(Opaque::new(key))
    }
}

struct Greeting {
    text: String,
}

fn install_greeting(builder: &mut SchemaBuilder) -> Result<()> {
    builder
        .define::<Greeting>()?
        .write(|g, ser| ser.write_str(&g.text))?
        .read(|de| Ok(Greeting { text: de.read_str()? }))?
        .reinstall_key("greeting");
    Ok(())
}

#[test]
fn schema_round_trips_through_its_own_wire_encoding() {
    let mut builder = Schema::builder();
    install_greeting(&mut builder).unwrap();
    let original = builder.finalize().unwrap();

    let bytes = original.to_bytes(&KeyCodec).unwrap();

    let mut registry: HashMap<&str, ReinstallFn> = HashMap::new();
    registry.insert("greeting", install_greeting);

    let restored = Schema::from_bytes(&bytes, &registry, &KeyCodec).unwrap();

    let value = Greeting { text: "hello".to_string() };
    let mut buf = Vec::new();
    {
        let mut ser = Serializer::new(&mut buf, &restored, &KeyCodec);
        ser.write_poly(&value as &dyn wiretype::Poly).unwrap();
    }
    let mut slice = buf.as_slice();
    let mut de = Deserializer::new(&mut slice, &restored, &KeyCodec);
    let boxed = de.read_poly().unwrap().expect("non-null");
    let decoded = boxed.downcast::<Greeting>().expect("Greeting");
    assert_eq!(decoded.text, "hello");
    assert!(slice.is_empty());
}

#[test]
fn from_bytes_rejects_an_unregistered_reinstall_key() {
    let mut builder = Schema::builder();
    install_greeting(&mut builder).unwrap();
    let original = builder.finalize().unwrap();
    let bytes = original.to_bytes(&KeyCodec).unwrap();

    let empty_registry: HashMap<&str, ReinstallFn> = HashMap::new();
    let err = Schema::from_bytes(&bytes, &empty_registry, &KeyCodec).unwrap_err();
    assert_eq!(err.kind(), wiretype::ErrorKind::MalformedProtocol);
}
