//! Shared field-mapping plumbing used by all four format connectors.

use super::fields;
use crate::classify::ParsedRecord;
use crate::coercion::{self, RawValue};
use crate::errors::{ErrorCode, FieldError};
use crate::models::CoercionRecord;
use std::collections::BTreeMap;

/// The common subset of every record shape: title/upc/sku/price/sale_price
/// plus the descriptive fields every connector maps the same way. Callers
/// fill in `in_stock` and any format-specific warnings afterward.
pub fn map_common_fields(row: &BTreeMap<String, RawValue>) -> ParsedRecord {
    let raw = serde_json::to_value(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<BTreeMap<_, _>>())
        .unwrap_or(serde_json::Value::Null);

    let mut coercions: Vec<CoercionRecord> = Vec::new();

    let title = fields::first_present_str(row, fields::TITLE).unwrap_or_default();
    let title = coercion::trim_string(&title);

    let sku = fields::first_present_str(row, fields::SKU).unwrap_or_default();

    let upc_raw = fields::first_present_str(row, fields::UPC);
    let upc = upc_raw
        .as_deref()
        .and_then(|raw| coercion::coerce_upc_audited("upc", raw, &mut coercions));

    let price_raw = fields::first_present_str(row, fields::PRICE);
    let price = price_raw
        .as_deref()
        .and_then(|raw| coercion::coerce_number_audited("price", raw, &mut coercions));

    let sale_price_raw = fields::first_present_str(row, fields::SALE_PRICE);
    let sale_price = sale_price_raw
        .as_deref()
        .and_then(|raw| coercion::coerce_number_audited("sale_price", raw, &mut coercions));

    let description = fields::first_present_str(row, fields::DESCRIPTION);
    let image_url = fields::first_present_str(row, fields::IMAGE);
    let brand = fields::first_present_str(row, fields::BRAND);
    let caliber = fields::first_present_str(row, fields::CALIBER);
    let grain = fields::first_present_str(row, fields::GRAIN).and_then(|raw| coercion::coerce_grain(&raw));

    ParsedRecord {
        title,
        upc,
        upc_raw,
        sku,
        price,
        sale_price,
        description,
        image_url,
        brand,
        caliber,
        grain,
        in_stock: true,
        coercions,
        warnings: Vec::new(),
        raw,
    }
}

/// Prefers `sale_price` over `price` whenever `sale_price > 0`, even if
/// higher than the regular price.
pub fn apply_sale_price_preference(record: &mut ParsedRecord) {
    if let Some(sale) = record.sale_price {
        if sale > 0.0 {
            record.price = Some(sale);
        }
    }
}

/// Appends MISSING_CALIBER / MISSING_BRAND warnings without blocking
/// indexability.
pub fn warn_missing_caliber_and_brand(record: &mut ParsedRecord) {
    if record.caliber.is_none() {
        record
            .warnings
            .push(FieldError::new("caliber", ErrorCode::MissingCaliber, "caliber not present"));
    }
    if record.brand.is_none() {
        record
            .warnings
            .push(FieldError::new("brand", ErrorCode::MissingBrand, "brand not present"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::dialect::{self, Container};

    #[test]
    fn sale_price_preference_overrides_even_when_higher() {
        let bytes = br#"[{"title":"t","price":19.99,"sale_price":25.99,"upc":"012345678905","sku":"s"}]"#;
        let rows = dialect::extract_rows(bytes, Container::Json).unwrap();
        let mut record = map_common_fields(&rows[0]);
        apply_sale_price_preference(&mut record);
        assert_eq!(record.price, Some(25.99));
    }
}
