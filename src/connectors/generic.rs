//! The catch-all connector: never rejects content, applies only the common
//! field-synonym mapping.

use super::common::map_common_fields;
use super::dialect::{self, Container};
use super::fields;
use super::{Connector, FieldMapping, ParseOutcome};
use crate::coercion;
use crate::errors::PipelineError;
use crate::models::FormatKind;

pub struct GenericConnector;

impl Connector for GenericConnector {
    fn can_handle(&self, _bytes: &[u8]) -> bool {
        true
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let container = dialect::detect_container(bytes);
        let rows = dialect::extract_rows(bytes, container)?;
        let records = rows
            .into_iter()
            .map(|row| {
                let mut record = map_common_fields(&row);
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
        FormatKind::Generic
    }

    fn name(&self) -> &'static str {
        "generic"
    }

    fn field_mapping(&self) -> FieldMapping {
        FieldMapping {
            groups: vec![
                ("title", fields::TITLE),
                ("price", fields::PRICE),
                ("upc", fields::UPC),
                ("sku", fields::SKU),
                ("description", fields::DESCRIPTION),
                ("brand", fields::BRAND),
                ("stock", fields::STOCK),
                ("url", fields::URL),
                ("image", fields::IMAGE),
                ("category", fields::CATEGORY),
                ("caliber", fields::CALIBER),
                ("grain", fields::GRAIN),
                ("bullet_type", fields::BULLET_TYPE),
                ("case", fields::CASE),
                ("round_count", fields::ROUND_COUNT),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_connector_never_rejects_bytes_at_can_handle() {
        let connector = GenericConnector;
        assert!(connector.can_handle(b""));
        assert!(connector.can_handle(b"not even close to a feed"));
    }

    #[test]
    fn generic_connector_parses_minimal_json_array() {
        let connector = GenericConnector;
        let bytes = br#"[{"name":"Widget","price":"$9.99","upc":"012345678905"}]"#;
        let outcome = connector.parse(bytes).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].price, Some(9.99));
        assert!(outcome.records[0].in_stock);
    }
}
