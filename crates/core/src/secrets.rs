//! Secret generation and log redaction.
//!
//! Generated passwords live only in cluster secrets; anything that flows
//! through the log pipeline passes through [`redact_value`] first.

use base64::Engine;
use rand::RngCore;
use serde_json::Value;

/// Number of random bytes behind each generated password.
const PASSWORD_ENTROPY_BYTES: usize = 24;

/// Minimum rendered password length after stripping.
const PASSWORD_MIN_LEN: usize = 20;

/// Generate a random password: at least [`PASSWORD_ENTROPY_BYTES`] bytes
/// of CSPRNG output, base64-rendered with non-alphanumerics stripped.
pub fn generate_password() -> String {
    loop {
        let mut bytes = [0u8; PASSWORD_ENTROPY_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let rendered: String = base64::engine::general_purpose::STANDARD_NO_PAD
            .encode(bytes)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        // Stripping can only remove a handful of characters; regenerate on
        // the off chance it shortens the result below the floor.
        if rendered.len() >= PASSWORD_MIN_LEN {
            return rendered;
        }
    }
}

/// Whether a field name refers to secret material.
fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key.contains("secret") || key.contains("token")
}

/// Replacement for redacted values.
pub const REDACTED: &str = "[redacted]";

/// Recursively redact values whose key matches password/secret/token
/// anywhere in the record path.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_value(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        _ => {}
    }
}
