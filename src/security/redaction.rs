// Simple helpers to avoid accidental printing of secrets in logs/tests.
use std::env;

/// Redact a text body unless DEV_PRINT_SECRETS=1 is set in the environment.
/// By default this returns a short placeholder containing only the length.
pub fn redact_body(s: &str) -> String {
    if env::var("DEV_PRINT_SECRETS").ok().as_deref() == Some("1") {
        return s.to_string();
    }
    format!("<redacted len={}>", s.len())
}

/// Redact hex-serializable bytes unless DEV_PRINT_SECRETS=1 is set.
pub fn redact_hex_bytes(bytes: &[u8]) -> String {
    if env::var("DEV_PRINT_SECRETS").ok().as_deref() == Some("1") {
        return format!("0x{}", hex::encode(bytes));
    }
    format!("<redacted hex len={}>", bytes.len())
}

/// Redact the request fields that may carry secrets before a JSON body is logged.
pub fn redact_json_params(value: &serde_json::Value) -> serde_json::Value {
    const SECRET_FIELDS: [&str; 6] =
        ["password", "oldPassword", "newPassword", "mnemonic", "privateKey", "derivedKey"];
    let mut out = value.clone();
    if let Some(map) = out.as_object_mut() {
        for field in SECRET_FIELDS {
            if let Some(v) = map.get_mut(field) {
                let len = v.as_str().map(str::len).unwrap_or(0);
                *v = serde_json::Value::String(format!("<redacted len={}>", len));
            }
        }
    }
    out
}
