//! Content-addressing helpers used for dedup keys across the pipeline.
//!
//! All three hashes are pure functions of their normalized inputs: same
//! inputs always produce the same bytes, independent of process, time, or
//! whitespace/case noise in the title component.

use sha2::{Digest, Sha256};

fn normalized_title(title: &str) -> String {
    title.trim().to_lowercase()
}

fn first16(digest: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// `DealerSku` identity: first 16 bytes of SHA-256 over
/// `lower(trim(title))|upc|sku|price`.
pub fn sku_hash(title: &str, upc: &str, sku: &str, price: f64) -> [u8; 16] {
    let input = format!("{}|{}|{}|{}", normalized_title(title), upc, sku, price);
    let digest = Sha256::digest(input.as_bytes());
    first16(&digest)
}

/// `QuarantinedRecord` identity: first 16 bytes of SHA-256 over
/// `lower(trim(title))|sku`.
pub fn match_key(title: &str, sku: &str) -> [u8; 16] {
    let input = format!("{}|{}", normalized_title(title), sku);
    let digest = Sha256::digest(input.as_bytes());
    first16(&digest)
}

/// Full-width content digest used by the ingest content-hash gate.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn to_hex(hash: [u8; 16]) -> String {
    hex::encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_hash_is_order_independent_of_whitespace_and_case_in_title() {
        let a = sku_hash("Hornady Critical Defense", "012345678905", "H1234", 24.99);
        let b = sku_hash("  hornady critical defense  ", "012345678905", "H1234", 24.99);
        assert_eq!(a, b);
    }

    #[test]
    fn sku_hash_is_stable_across_runs() {
        let a = sku_hash("Federal 9mm", "012345678905", "F9", 19.99);
        let b = sku_hash("Federal 9mm", "012345678905", "F9", 19.99);
        assert_eq!(a, b);
    }

    #[test]
    fn sku_hash_differs_on_price_change() {
        let a = sku_hash("Federal 9mm", "012345678905", "F9", 19.99);
        let b = sku_hash("Federal 9mm", "012345678905", "F9", 20.99);
        assert_ne!(a, b);
    }

    #[test]
    fn match_key_is_case_insensitive_on_title() {
        let a = match_key("Winchester White Box", "WB-001");
        let b = match_key("WINCHESTER WHITE BOX", "WB-001");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let bytes = b"same bytes twice";
        assert_eq!(content_hash(bytes), content_hash(bytes));
    }
}
