//! JSON encoding for mapped (table-backed) models: only column fields are emitted.

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A model whose persisted columns are known. Anything else on the struct
/// (relationships, caches, request state) is left out of the JSON.
pub trait Mapped {
    fn mapped_columns(&self) -> &[&'static str];
}

/// Encode the mapped columns of `obj` as a JSON object.
pub fn encode_mapped<T: Serialize + Mapped>(obj: &T) -> serde_json::Result<Value> {
    let value = serde_json::to_value(obj)?;
    let Value::Object(fields) = value else {
        return Err(serde_json::Error::custom("mapped model must serialize to an object"));
    };
    let columns = obj.mapped_columns();
    let kept: Map<String, Value> = fields.into_iter().filter(|(k, _)| columns.contains(&k.as_str())).collect();
    Ok(Value::Object(kept))
}

pub fn to_string_mapped<T: Serialize + Mapped>(obj: &T) -> serde_json::Result<String> {
    serde_json::to_string(&encode_mapped(obj)?)
}

/// Serialize wrapper so mapped models can be embedded in larger payloads.
pub struct MappedJson<'a, T>(pub &'a T);

impl<T: Serialize + Mapped> Serialize for MappedJson<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Value::Object(fields) = encode_mapped(self.0).map_err(S::Error::custom)? else {
            return Err(S::Error::custom("mapped model must serialize to an object"));
        };
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (k, v) in &fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
