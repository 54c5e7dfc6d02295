//! Field synonym groups shared by every format connector.
//!
//! Per group, the first present, non-empty field wins.

use crate::coercion::RawValue;
use std::collections::BTreeMap;

pub const TITLE: &[&str] = &["title", "name", "product_name"];
pub const PRICE: &[&str] = &["price", "msrp", "list_price"];
pub const SALE_PRICE: &[&str] = &["sale_price", "special_price"];
pub const UPC: &[&str] = &["upc", "gtin", "barcode"];
pub const SKU: &[&str] = &["sku", "item_id", "mpn", "part_number"];
pub const DESCRIPTION: &[&str] = &["description", "desc", "short_description"];
pub const BRAND: &[&str] = &["brand", "manufacturer"];
pub const STOCK: &[&str] = &["stock", "in_stock", "stock_status", "availability", "quantity"];
pub const URL: &[&str] = &["url", "link", "product_url"];
pub const IMAGE: &[&str] = &["image", "image_url", "img"];
pub const CATEGORY: &[&str] = &["category", "product_category"];
pub const CALIBER: &[&str] = &["caliber", "calibre"];
pub const GRAIN: &[&str] = &["grain", "bullet_weight", "weight_grains"];
pub const BULLET_TYPE: &[&str] = &["bullet_type", "bullet_style"];
pub const CASE: &[&str] = &["case", "casing", "case_material"];
pub const ROUND_COUNT: &[&str] = &["round_count", "rounds_per_box", "box_count"];

/// Returns the first non-empty field present in `row` among `synonyms`,
/// along with the field name that matched (for coercion audit messages).
pub fn first_present<'a>(
    row: &'a BTreeMap<String, RawValue>,
    synonyms: &'static [&'static str],
) -> Option<(&'static str, &'a RawValue)> {
    synonyms.iter().find_map(|&key| {
        row.get(key).and_then(|v| {
            let non_empty = match v {
                RawValue::String(s) => !s.trim().is_empty(),
                RawValue::Null => false,
                _ => true,
            };
            non_empty.then_some((key, v))
        })
    })
}

pub fn first_present_str(row: &BTreeMap<String, RawValue>, synonyms: &'static [&'static str]) -> Option<String> {
    first_present(row, synonyms).map(|(_, v)| v.to_display_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_present_honors_synonym_order() {
        let mut row = BTreeMap::new();
        row.insert("name".to_string(), RawValue::String("Widget".to_string()));
        row.insert("title".to_string(), RawValue::String("Override".to_string()));
        let (key, value) = first_present(&row, TITLE).unwrap();
        assert_eq!(key, "title");
        assert_eq!(value.as_str(), Some("Override"));
    }

    #[test]
    fn first_present_skips_empty_strings() {
        let mut row = BTreeMap::new();
        row.insert("title".to_string(), RawValue::String("  ".to_string()));
        row.insert("name".to_string(), RawValue::String("Fallback".to_string()));
        let (key, _) = first_present(&row, TITLE).unwrap();
        assert_eq!(key, "name");
    }
}
