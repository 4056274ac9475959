//! Hash helpers – abstracción para poder cambiar de algoritmo sin tocar el resto del core.
//!
//! - Identidad de contenido (bindings, claves de artifacts): blake3 en hex.
//! - Checksum de archivos de artifacts: sha256 en hex.

use std::fs;
use std::path::Path;

use blake3::Hasher;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::to_canonical_json;

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hash de un `Value` sobre su forma canónica.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}

/// Representación textual estable de un valor de literal.
///
/// Los strings se usan tal cual (sin comillas); el resto se renderiza como JSON
/// canónico, de modo que `0.0` y `"0.0"` producen la misma representación.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => to_canonical_json(other),
    }
}

/// Hash de contenido de un valor: `hash_str(stringify(value))`.
pub fn content_hash(value: &Value) -> String {
    hash_str(&stringify(value))
}

/// Checksum de la ubicación de un artifact.
///
/// Si `location` (resuelta contra `base` cuando es relativa) apunta a un archivo
/// legible se hashean sus bytes; si no existe se hashea el texto de la ubicación.
pub fn file_checksum(location: &str, base: &Path) -> std::io::Result<String> {
    let path = Path::new(location);
    let path = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    let mut hasher = Sha256::new();
    if path.is_file() {
        hasher.update(fs::read(&path)?);
    } else {
        hasher.update(location.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}
