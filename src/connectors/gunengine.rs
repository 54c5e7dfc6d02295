//! GUNENGINE_V2 connector.
//!
//! Requires `item_id` + `manufacturer` plus either `stock_status` or a V2
//! marker (`bullet_weight` / `rounds_per_box`). Stock words: in/instock/
//! available/limited -> true; out/unavailable -> false; default true.

use super::common::map_common_fields;
use super::dialect::{self, Container};
use super::fields;
use super::{Connector, FieldMapping, ParseOutcome};
use crate::errors::PipelineError;
use crate::models::FormatKind;

pub struct GunengineConnector;

fn looks_like_gunengine(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes).to_lowercase();
    let has_identity = text.contains("item_id") && text.contains("manufacturer");
    let has_marker =
        text.contains("stock_status") || text.contains("bullet_weight") || text.contains("rounds_per_box");
    has_identity && has_marker
}

/// GUNENGINE_V2's own stock vocabulary, distinct from the generic
/// yes/no/in-stock words in [`crate::coercion::coerce_bool`].
fn coerce_gunengine_stock(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    if lower.contains("out") || lower.contains("unavailable") {
        false
    } else if lower.contains("in") || lower.contains("instock") || lower.contains("available") || lower.contains("limited") {
        true
    } else {
        true // default true if missing/unrecognized
    }
}

impl Connector for GunengineConnector {
    fn can_handle(&self, bytes: &[u8]) -> bool {
        looks_like_gunengine(bytes)
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let container = dialect::detect_container(bytes);
        let rows = dialect::extract_rows(bytes, container)?;
        let records = rows
            .into_iter()
            .map(|row| {
                let mut record = map_common_fields(&row);
                let stock_raw = fields::first_present_str(&row, fields::STOCK);
                record.in_stock = match stock_raw {
                    Some(raw) => coerce_gunengine_stock(&raw),
                    None => true,
                };
                record
            })
            .collect();
        Ok(ParseOutcome { records })
    }

    fn format_type(&self) -> FormatKind {
        FormatKind::GunengineV2
    }

    fn name(&self) -> &'static str {
        "gunengine_v2"
    }

    fn field_mapping(&self) -> FieldMapping {
        FieldMapping {
            groups: vec![
                ("title", fields::TITLE),
                ("price", fields::PRICE),
                ("sku", fields::SKU), // item_id
                ("brand", fields::BRAND), // manufacturer
                ("stock", fields::STOCK),
                ("grain", fields::GRAIN), // bullet_weight
                ("round_count", fields::ROUND_COUNT), // rounds_per_box
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_handle_requires_identity_and_v2_marker() {
        let connector = GunengineConnector;
        assert!(connector.can_handle(br#"[{"item_id":"1","manufacturer":"Federal","bullet_weight":"115"}]"#));
        assert!(!connector.can_handle(br#"[{"item_id":"1","manufacturer":"Federal"}]"#));
        assert!(!connector.can_handle(br#"[{"bullet_weight":"115"}]"#));
    }

    #[test]
    fn stock_words_map_per_vocabulary() {
        assert!(coerce_gunengine_stock("In Stock"));
        assert!(coerce_gunengine_stock("Limited"));
        assert!(!coerce_gunengine_stock("Out of Stock"));
        assert!(!coerce_gunengine_stock("Unavailable"));
        assert!(coerce_gunengine_stock("whatever-unknown"));
    }

    #[test]
    fn missing_stock_field_defaults_true() {
        let connector = GunengineConnector;
        let bytes = br#"[{"item_id":"1","manufacturer":"Federal","bullet_weight":"115","title":"t","price":1}]"#;
        let outcome = connector.parse(bytes).unwrap();
        assert!(outcome.records[0].in_stock);
    }
}
