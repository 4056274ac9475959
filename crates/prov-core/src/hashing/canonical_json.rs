//! Canonical JSON mínimo: claves ordenadas, sin espacios.
//!
//! Dos `Value` iguales salvo por el orden de claves producen el mismo string,
//! lo que permite usarlo como entrada estable para los hashes de contenido.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // `Display` de `Value` escapa el string igual que `serde_json::to_string`.
        Value::String(_) => value.to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let v = json!({"b": 1, "a": {"d": true, "c": null}});
        assert_eq!(to_canonical_json(&v), r#"{"a":{"c":null,"d":true},"b":1}"#);
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!(["x\"y", 0.5]);
        assert_eq!(to_canonical_json(&v), r#"["x\"y",0.5]"#);
    }
}
