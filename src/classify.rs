//! Record classification truth table.

use crate::errors::{ErrorCode, FieldError};
use crate::models::CoercionRecord;
use serde::{Deserialize, Serialize};

/// A single parsed-and-coerced record, prior to lane classification. Every
/// connector produces these regardless of source format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub title: String,
    /// `Some` only if coercion produced a structurally valid UPC.
    pub upc: Option<String>,
    /// The original UPC-ish text, kept for error messages even when invalid.
    pub upc_raw: Option<String>,
    pub sku: String,
    pub price: Option<f64>,
    pub sale_price: Option<f64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub brand: Option<String>,
    pub caliber: Option<String>,
    pub grain: Option<u32>,
    pub in_stock: bool,
    pub coercions: Vec<CoercionRecord>,
    /// Non-blocking diagnostics accumulated during field mapping (e.g. a
    /// format-specific MISSING_CALIBER warning that never blocks indexing).
    pub warnings: Vec<FieldError>,
    pub raw: serde_json::Value,
}

impl ParsedRecord {
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn has_valid_price(&self) -> bool {
        matches!(self.price, Some(p) if p > 0.0)
    }

    pub fn has_valid_upc(&self) -> bool {
        self.upc.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lane {
    Indexable,
    Quarantine(Vec<FieldError>),
    Reject(Vec<FieldError>),
}

/// Applies the lane-classification truth table:
///
/// | validUPC | hasTitle | hasPrice | Lane        |
/// |----------|----------|----------|-------------|
/// | T        | T        | T        | indexable   |
/// | F        | T        | T        | quarantine  |
/// | -        | F or F   | -        | reject      |
pub fn classify(record: &ParsedRecord) -> Lane {
    let has_title = record.has_title();
    let has_price = record.has_valid_price();

    if !has_title || !has_price {
        let mut errors = Vec::new();
        if !has_title {
            errors.push(FieldError::new("title", ErrorCode::MissingTitle, "title is empty"));
        }
        if !has_price {
            let message = match record.price {
                None => "price is missing",
                Some(_) => "price is not a positive number",
            };
            errors.push(FieldError::new("price", ErrorCode::InvalidPrice, message));
        }
        return Lane::Reject(errors);
    }

    if record.has_valid_upc() {
        return Lane::Indexable;
    }

    let code = match &record.upc_raw {
        None => ErrorCode::MissingUpc,
        Some(_) => ErrorCode::InvalidUpc,
    };
    let message = match code {
        ErrorCode::MissingUpc => "upc is missing",
        _ => "upc failed to normalize to a valid 8-14 digit code",
    };
    let mut error = FieldError::new("upc", code, message);
    if let Some(raw) = &record.upc_raw {
        error = error.with_raw_value(raw.clone());
    }
    Lane::Quarantine(vec![error])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> ParsedRecord {
        ParsedRecord {
            title: "Federal 9mm 115gr FMJ".to_string(),
            upc: Some("012345678905".to_string()),
            upc_raw: Some("012345678905".to_string()),
            sku: "F9FMJ".to_string(),
            price: Some(19.99),
            sale_price: None,
            description: None,
            image_url: None,
            brand: Some("Federal".to_string()),
            caliber: Some("9mm".to_string()),
            grain: Some(115),
            in_stock: true,
            coercions: vec![],
            warnings: vec![],
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn valid_record_is_indexable() {
        assert_eq!(classify(&base_record()), Lane::Indexable);
    }

    #[test]
    fn missing_upc_is_quarantined_not_rejected() {
        let mut r = base_record();
        r.upc = None;
        r.upc_raw = None;
        match classify(&r) {
            Lane::Quarantine(errors) => assert_eq!(errors[0].code, ErrorCode::MissingUpc),
            other => panic!("expected quarantine, got {other:?}"),
        }
    }

    #[test]
    fn invalid_upc_with_garbage_is_quarantined_not_rejected() {
        let mut r = base_record();
        r.upc = None;
        r.upc_raw = Some("123".to_string());
        match classify(&r) {
            Lane::Quarantine(errors) => assert_eq!(errors[0].code, ErrorCode::InvalidUpc),
            other => panic!("expected quarantine, got {other:?}"),
        }
    }

    #[test]
    fn missing_title_is_rejected() {
        let mut r = base_record();
        r.title = "   ".to_string();
        match classify(&r) {
            Lane::Reject(errors) => {
                assert!(errors.iter().any(|e| e.code == ErrorCode::MissingTitle))
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn zero_price_is_rejected() {
        let mut r = base_record();
        r.price = Some(0.0);
        match classify(&r) {
            Lane::Reject(errors) => {
                assert!(errors.iter().any(|e| e.code == ErrorCode::InvalidPrice))
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn missing_title_and_price_both_rejected_with_both_errors() {
        let mut r = base_record();
        r.title = "".to_string();
        r.price = None;
        match classify(&r) {
            Lane::Reject(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected reject, got {other:?}"),
        }
    }
}
