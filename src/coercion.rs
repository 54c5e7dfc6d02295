//! Field coercion rules.
//!
//! Every coercion that actually changes a value is recorded as a
//! [`crate::models::CoercionRecord`] so ingest runs stay auditable.

use crate::models::CoercionRecord;
use std::collections::BTreeMap;

/// A raw, heterogeneous input value as parsed off the wire, before coercion.
/// Preserved verbatim alongside the strongly-typed coerced record for audit.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => n.to_string(),
            RawValue::String(s) => s.clone(),
            RawValue::List(_) | RawValue::Map(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Null => serde_json::Value::Null,
            RawValue::Bool(b) => serde_json::Value::Bool(*b),
            RawValue::Number(n) => serde_json::json!(n),
            RawValue::String(s) => serde_json::Value::String(s.clone()),
            RawValue::List(items) => {
                serde_json::Value::Array(items.iter().map(RawValue::to_json).collect())
            }
            RawValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// `"$1,234.56"`, `"18.99 USD"`, `"  18.99  "` -> a plain `f64`.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// `"115 grains"` -> `115`.
pub fn coerce_grain(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        // grain strings sometimes lead with non-digit noise; fall back to the
        // first contiguous digit run anywhere in the string.
        let mut current = String::new();
        for c in raw.chars() {
            if c.is_ascii_digit() {
                current.push(c);
            } else if !current.is_empty() {
                return current.parse().ok();
            }
        }
        return current.parse().ok().filter(|_| !current.is_empty());
    }
    digits.parse().ok()
}

const TRUE_WORDS: &[&str] = &["true", "yes", "y", "1", "in stock", "available"];
const FALSE_WORDS: &[&str] = &["false", "no", "n", "0", "out of stock", "unavailable"];

/// Boolean coercion over a closed vocabulary of truthy/falsy words.
pub fn coerce_bool(raw: &str) -> Option<bool> {
    let lower = raw.trim().to_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Normalizes a UPC/GTIN-ish string to digits-only, stripping labels like
/// `"UPC:"` / `"GTIN:"` and separator characters. Returns `None` if the
/// final digit count is outside `[8..14]`.
pub fn coerce_upc(raw: &str) -> Option<String> {
    let without_label = raw
        .trim()
        .trim_start_matches("UPC:")
        .trim_start_matches("upc:")
        .trim_start_matches("GTIN:")
        .trim_start_matches("gtin:");
    let digits: String = without_label.chars().filter(|c| c.is_ascii_digit()).collect();
    if (8..=14).contains(&digits.len()) {
        Some(digits)
    } else {
        None
    }
}

pub fn trim_string(raw: &str) -> String {
    raw.trim().to_string()
}

/// Applies [`coerce_number`] and records a [`CoercionRecord`] if the textual
/// representation actually changed.
pub fn coerce_number_audited(field: &str, raw: &str, out: &mut Vec<CoercionRecord>) -> Option<f64> {
    let value = coerce_number(raw)?;
    let normalized = value.to_string();
    if normalized != raw.trim() {
        out.push(CoercionRecord {
            field: field.to_string(),
            from: raw.to_string(),
            to: normalized,
        });
    }
    Some(value)
}

pub fn coerce_upc_audited(field: &str, raw: &str, out: &mut Vec<CoercionRecord>) -> Option<String> {
    let value = coerce_upc(raw)?;
    if value != raw.trim() {
        out.push(CoercionRecord {
            field: field.to_string(),
            from: raw.to_string(),
            to: value.clone(),
        });
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_coercion_strips_currency_noise() {
        assert_eq!(coerce_number("$1,234.56"), Some(1234.56));
        assert_eq!(coerce_number("18.99 USD"), Some(18.99));
        assert_eq!(coerce_number("  18.99  "), Some(18.99));
    }

    #[test]
    fn number_coercion_rejects_empty() {
        assert_eq!(coerce_number("   "), None);
        assert_eq!(coerce_number("USD"), None);
    }

    #[test]
    fn grain_coercion_extracts_leading_digits() {
        assert_eq!(coerce_grain("115 grains"), Some(115));
        assert_eq!(coerce_grain("124gr"), Some(124));
    }

    #[test]
    fn bool_coercion_matches_closed_vocabulary() {
        assert_eq!(coerce_bool("Yes"), Some(true));
        assert_eq!(coerce_bool("In Stock"), Some(true));
        assert_eq!(coerce_bool("Out of Stock"), Some(false));
        assert_eq!(coerce_bool("n"), Some(false));
        assert_eq!(coerce_bool("maybe"), None);
    }

    #[test]
    fn upc_coercion_strips_labels_and_separators() {
        assert_eq!(coerce_upc("UPC:012-345-678-901"), Some("012345678901".to_string()));
        assert_eq!(coerce_upc("GTIN: 00012345678905"), Some("00012345678905".to_string()));
    }

    #[test]
    fn upc_coercion_boundary_lengths() {
        assert_eq!(coerce_upc("1234567"), None); // 7 digits: invalid
        assert_eq!(coerce_upc("12345678"), Some("12345678".to_string())); // 8: valid
        assert_eq!(coerce_upc("12345678901234"), Some("12345678901234".to_string())); // 14: valid
        assert_eq!(coerce_upc("123456789012345"), None); // 15: invalid
    }

    #[test]
    fn audited_number_coercion_only_records_on_change() {
        let mut audit = Vec::new();
        coerce_number_audited("price", "19.99", &mut audit);
        assert!(audit.is_empty());
        coerce_number_audited("price", "$19.99", &mut audit);
        assert_eq!(audit.len(), 1);
    }
}
