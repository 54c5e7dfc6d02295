//! IMPACT connector.
//!
//! Numeric stock-quantity strings (`"5 in stock"`) map to `qty > 0`;
//! unknown strings default true.

use super::common::map_common_fields;
use super::dialect::{self, Container};
use super::fields;
use super::{Connector, FieldMapping, ParseOutcome};
use crate::coercion;
use crate::errors::PipelineError;
use crate::models::FormatKind;

pub struct ImpactConnector;

fn looks_like_impact(bytes: &[u8]) -> bool {
    String::from_utf8_lossy(bytes).to_lowercase().contains("qty")
}

fn coerce_impact_stock(raw: &str) -> bool {
    if let Some(qty) = coercion::coerce_number(raw) {
        return qty > 0.0;
    }
    coercion::coerce_bool(raw).unwrap_or(true)
}

impl Connector for ImpactConnector {
    fn can_handle(&self, bytes: &[u8]) -> bool {
        looks_like_impact(bytes)
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let container = dialect::detect_container(bytes);
        let rows = dialect::extract_rows(bytes, container)?;
        let records = rows
            .into_iter()
            .map(|row| {
                let mut record = map_common_fields(&row);
                let stock_raw = row
                    .get("qty")
                    .map(|v| v.to_display_string())
                    .or_else(|| fields::first_present_str(&row, fields::STOCK));
                record.in_stock = stock_raw.as_deref().map(coerce_impact_stock).unwrap_or(true);
                record
            })
            .collect();
        Ok(ParseOutcome { records })
    }

    fn format_type(&self) -> FormatKind {
        FormatKind::Impact
    }

    fn name(&self) -> &'static str {
        "impact"
    }

    fn field_mapping(&self) -> FieldMapping {
        FieldMapping {
            groups: vec![
                ("title", fields::TITLE),
                ("price", fields::PRICE),
                ("upc", fields::UPC),
                ("sku", fields::SKU),
                ("qty", &["qty"]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_qty_strings_map_to_qty_greater_than_zero() {
        assert!(coerce_impact_stock("5 in stock"));
        assert!(!coerce_impact_stock("0"));
    }

    #[test]
    fn unknown_strings_default_true() {
        assert!(coerce_impact_stock("backordered-unclear"));
    }

    #[test]
    fn parses_qty_field_into_in_stock() {
        let connector = ImpactConnector;
        let bytes = br#"[{"title":"t","price":1,"upc":"012345678905","sku":"s","qty":"0 in stock"}]"#;
        let outcome = connector.parse(bytes).unwrap();
        assert!(!outcome.records[0].in_stock);
    }
}
