//! AMMOSEEK_V1 connector.
//!
//! Requires `{upc, title|product_name, price, link|url}`; prefers
//! `sale_price` over `price` whenever `sale_price > 0`, even when higher
//! than the regular price. Missing caliber/brand only warns.

use super::common::{apply_sale_price_preference, map_common_fields, warn_missing_caliber_and_brand};
use super::dialect::{self, Container};
use super::fields;
use super::{Connector, FieldMapping, ParseOutcome};
use crate::coercion;
use crate::errors::PipelineError;
use crate::models::FormatKind;

pub struct AmmoseekConnector;

fn looks_like_ammoseek(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes).to_lowercase();
    text.contains("sale_price") || text.contains("product_name")
}

impl Connector for AmmoseekConnector {
    fn can_handle(&self, bytes: &[u8]) -> bool {
        looks_like_ammoseek(bytes)
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let container = dialect::detect_container(bytes);
        let rows = dialect::extract_rows(bytes, container)?;
        let records = rows
            .into_iter()
            .map(|row| {
                let mut record = map_common_fields(&row);
                apply_sale_price_preference(&mut record);
                warn_missing_caliber_and_brand(&mut record);
                let stock_raw = fields::first_present_str(&row, fields::STOCK);
                record.in_stock = stock_raw
                    .as_deref()
                    .and_then(coercion::coerce_bool)
                    .unwrap_or(true);
                record
            })
            .collect();
        Ok(ParseOutcome { records })
    }

    fn format_type(&self) -> FormatKind {
        FormatKind::AmmoseekV1
    }

    fn name(&self) -> &'static str {
        "ammoseek_v1"
    }

    fn field_mapping(&self) -> FieldMapping {
        FieldMapping {
            groups: vec![
                ("title", fields::TITLE),
                ("price", fields::PRICE),
                ("sale_price", fields::SALE_PRICE),
                ("upc", fields::UPC),
                ("url", fields::URL),
                ("brand", fields::BRAND),
                ("caliber", fields::CALIBER),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_handle_detects_ammoseek_markers() {
        let connector = AmmoseekConnector;
        assert!(connector.can_handle(br#"[{"product_name":"x"}]"#));
        assert!(connector.can_handle(br#"[{"sale_price":1.0}]"#));
        assert!(!connector.can_handle(br#"[{"item_id":"1","manufacturer":"x"}]"#));
    }

    #[test]
    fn higher_sale_price_is_still_preferred_s5() {
        let connector = AmmoseekConnector;
        let bytes = br#"[{"title":"t","upc":"012345678905","sku":"s","price":19.99,"sale_price":25.99,"url":"http://x"}]"#;
        let outcome = connector.parse(bytes).unwrap();
        assert_eq!(outcome.records[0].price, Some(25.99));
        assert_eq!(outcome.records[0].sale_price, Some(25.99));
    }

    #[test]
    fn missing_caliber_and_brand_only_warns() {
        let connector = AmmoseekConnector;
        let bytes = br#"[{"title":"t","upc":"012345678905","sku":"s","price":19.99}]"#;
        let outcome = connector.parse(bytes).unwrap();
        assert_eq!(outcome.records[0].warnings.len(), 2);
    }
}
