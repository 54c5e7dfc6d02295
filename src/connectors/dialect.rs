//! Format dispatch within a connector.
//!
//! Detects the container shape (XML / JSON / CSV / TSV) from the first
//! non-whitespace byte and a cheap header inspection, then flattens every
//! record into a `BTreeMap<String, RawValue>` so the field-synonym layer can
//! stay format-agnostic.

use crate::coercion::RawValue;
use crate::errors::PipelineError;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Xml,
    Json,
    Csv,
    Tsv,
}

const XML_CONTAINER_PATHS: &[&[&str]] = &[
    &["products", "product"],
    &["catalog", "product"],
    &["feed", "products", "product"],
    &["offers", "offer"],
];

const JSON_ARRAY_KEYS: &[&str] = &["products", "items", "data", "offers"];

pub fn detect_container(bytes: &[u8]) -> Container {
    let text = String::from_utf8_lossy(bytes);
    let first_non_ws = text.trim_start().chars().next();
    match first_non_ws {
        Some('<') => Container::Xml,
        Some('{') | Some('[') => Container::Json,
        _ => {
            let first_line = text.lines().next().unwrap_or("");
            let tabs = first_line.matches('\t').count();
            let commas = first_line.matches(',').count();
            if tabs > commas {
                Container::Tsv
            } else {
                Container::Csv
            }
        }
    }
}

/// Flattens the feed bytes into per-record field maps, dispatching on the
/// detected (or declared) container.
pub fn extract_rows(bytes: &[u8], container: Container) -> Result<Vec<BTreeMap<String, RawValue>>, PipelineError> {
    match container {
        Container::Json => extract_json(bytes),
        Container::Xml => extract_xml(bytes),
        Container::Csv => extract_delimited(bytes, b','),
        Container::Tsv => extract_delimited(bytes, b'\t'),
    }
}

fn extract_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<BTreeMap<String, RawValue>>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("csv header read failed: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                // A malformed line doesn't abort the run: it becomes an
                // empty row the classifier will reject as MALFORMED_ROW.
                tracing::debug!(error = %e, "skipping malformed csv/tsv row");
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue; // blank lines are skipped, not counted as records
        }
        let mut map = BTreeMap::new();
        for (idx, field) in record.iter().enumerate() {
            let key = headers
                .get(idx)
                .map(|h| h.trim().to_string())
                .unwrap_or_else(|| format!("column_{idx}"));
            map.insert(key, RawValue::String(field.trim().to_string()));
        }
        rows.push(map);
    }
    Ok(rows)
}

fn extract_json(bytes: &[u8]) -> Result<Vec<BTreeMap<String, RawValue>>, PipelineError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| PipelineError::Parse(format!("json parse failed: {e}")))?;

    let array = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(ref map) => {
            let found = JSON_ARRAY_KEYS.iter().find_map(|key| map.get(*key));
            match found {
                Some(serde_json::Value::Array(items)) => items.clone(),
                _ => vec![value.clone()], // bare object: single record
            }
        }
        other => vec![other],
    };

    Ok(array.into_iter().map(json_value_to_row).collect())
}

fn json_value_to_row(value: serde_json::Value) -> BTreeMap<String, RawValue> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json_value_to_raw(v)))
            .collect(),
        other => {
            let mut map = BTreeMap::new();
            map.insert("value".to_string(), json_value_to_raw(other));
            map
        }
    }
}

fn json_value_to_raw(value: serde_json::Value) -> RawValue {
    match value {
        serde_json::Value::Null => RawValue::Null,
        serde_json::Value::Bool(b) => RawValue::Bool(b),
        serde_json::Value::Number(n) => RawValue::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => RawValue::String(s),
        serde_json::Value::Array(items) => {
            RawValue::List(items.into_iter().map(json_value_to_raw).collect())
        }
        serde_json::Value::Object(map) => {
            RawValue::Map(map.into_iter().map(|(k, v)| (k, json_value_to_raw(v))).collect())
        }
    }
}

/// Minimal streaming XML flattener: walks the tag stack looking for one of
/// the known container paths, then collects each matched element's direct
/// child text nodes into a field map. The feed vocabulary is flat, so this
/// intentionally doesn't build a general tree.
fn extract_xml(bytes: &[u8]) -> Result<Vec<BTreeMap<String, RawValue>>, PipelineError> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    let mut current_row: Option<BTreeMap<String, RawValue>> = None;
    let mut current_field: Option<String> = None;
    let mut record_depth: usize = 0;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                stack.push(name.clone());
                if current_row.is_some() {
                    current_field = Some(name);
                } else if matches_any_container_path(&stack) {
                    current_row = Some(BTreeMap::new());
                    record_depth = stack.len();
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(row), Some(field)) = (current_row.as_mut(), current_field.as_ref()) {
                    let text = e
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_default();
                    row.insert(field.clone(), RawValue::String(text.trim().to_string()));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(depth) = stack.len().checked_sub(0) {
                    if current_row.is_some() && depth == record_depth {
                        rows.push(current_row.take().unwrap());
                        current_field = None;
                    }
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(PipelineError::Parse(format!("xml parse failed: {e}"))),
        }
        buf.clear();
    }

    Ok(rows)
}

fn matches_any_container_path(stack: &[String]) -> bool {
    XML_CONTAINER_PATHS.iter().any(|path| {
        if stack.len() < path.len() {
            return false;
        }
        let tail = &stack[stack.len() - path.len()..];
        tail.iter().zip(path.iter()).all(|(a, b)| a == b)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_xml_by_leading_angle_bracket() {
        assert_eq!(detect_container(b"<?xml version=\"1.0\"?><products/>"), Container::Xml);
        assert_eq!(detect_container(b"<products></products>"), Container::Xml);
    }

    #[test]
    fn detects_json_array_and_object() {
        assert_eq!(detect_container(b"[{\"a\":1}]"), Container::Json);
        assert_eq!(detect_container(b"{\"products\":[]}"), Container::Json);
    }

    #[test]
    fn detects_tsv_vs_csv_by_first_line_delimiter_count() {
        assert_eq!(detect_container(b"a\tb\tc\n1\t2\t3"), Container::Tsv);
        assert_eq!(detect_container(b"a,b,c\n1,2,3"), Container::Csv);
    }

    #[test]
    fn csv_extraction_trims_and_skips_blank_lines() {
        let bytes = b"title,price\n Widget , 9.99 \n\n,\nGadget,4.50\n";
        let rows = extract_rows(bytes, Container::Csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("title").unwrap().as_str(), Some("Widget"));
    }

    #[test]
    fn csv_extraction_tolerates_ragged_rows() {
        let bytes = b"title,price,upc\nWidget,9.99\nGadget,4.50,012345678905,extra\n";
        let rows = extract_rows(bytes, Container::Csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("upc").is_none());
    }

    #[test]
    fn json_extraction_unwraps_known_keys_in_order() {
        let bytes = br#"{"items":[{"title":"A"}],"products":[{"title":"B"}]}"#;
        let rows = extract_rows(bytes, Container::Json).unwrap();
        // "products" is tried before "items".
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title").unwrap().as_str(), Some("B"));
    }

    #[test]
    fn json_bare_object_is_a_single_record() {
        let bytes = br#"{"title":"Solo"}"#;
        let rows = extract_rows(bytes, Container::Json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title").unwrap().as_str(), Some("Solo"));
    }

    #[test]
    fn xml_extraction_walks_products_product_path() {
        let bytes = br#"<?xml version="1.0"?>
        <products>
            <product><title>Widget</title><price>9.99</price></product>
            <product><title>Gadget</title><price>4.50</price></product>
        </products>"#;
        let rows = extract_rows(bytes, Container::Xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("title").unwrap().as_str(), Some("Widget"));
    }

    #[test]
    fn xml_extraction_walks_offers_offer_path() {
        let bytes = br#"<offers><offer><title>Solo</title></offer></offers>"#;
        let rows = extract_rows(bytes, Container::Xml).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title").unwrap().as_str(), Some("Solo"));
    }
}
