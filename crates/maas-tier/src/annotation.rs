//! Codec for the `alpha.maas.opendatahub.io/tiers` workload annotation.
//!
//! The value is a JSON array of tier names, e.g. `["free","premium"]`. Some
//! external writers store the array as a JSON string (`"[\"free\"]"`); both
//! forms decode identically and are re-encoded in the compact array form.

use maas_common::{Error, Result};

/// Decode an annotation value. Empty means no tiers.
pub fn parse_tiers(value: &str) -> Result<Vec<String>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let decoded: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| Error::serialization(format!("invalid tiers annotation: {}", e)))?;

    match decoded {
        serde_json::Value::Array(_) => serde_json::from_value(decoded)
            .map_err(|e| Error::serialization(format!("invalid tiers annotation: {}", e))),
        serde_json::Value::String(inner) => {
            let inner = inner.trim();
            if inner.is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(inner).map_err(|e| {
                Error::serialization(format!("invalid embedded tiers annotation: {}", e))
            })
        }
        other => Err(Error::serialization(format!(
            "tiers annotation must be a JSON array, got {}",
            other
        ))),
    }
}

/// Encode tier names as a compact JSON array
pub fn format_tiers(tiers: &[String]) -> Result<String> {
    serde_json::to_string(tiers)
        .map_err(|e| Error::serialization(format!("failed to encode tiers annotation: {}", e)))
}

/// Append `tier` unless already listed. Returns true if the list changed.
pub fn add_tier(tiers: &mut Vec<String>, tier: &str) -> bool {
    if tiers.iter().any(|t| t == tier) {
        return false;
    }
    tiers.push(tier.to_string());
    true
}

/// Remove `tier`, keeping the order of the rest. Returns true if it was listed.
pub fn remove_tier(tiers: &mut Vec<String>, tier: &str) -> bool {
    match tiers.iter().position(|t| t == tier) {
        Some(idx) => {
            tiers.remove(idx);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_value_is_no_tiers() {
        assert!(parse_tiers("").unwrap().is_empty());
        assert!(parse_tiers("   ").unwrap().is_empty());
        assert!(parse_tiers("[]").unwrap().is_empty());
    }

    #[test]
    fn formatting_variants_decode_identically() {
        let expected = names(&["a", "b"]);
        assert_eq!(parse_tiers(r#"["a", "b"]"#).unwrap(), expected);
        assert_eq!(parse_tiers(r#"["a","b"]"#).unwrap(), expected);
        assert_eq!(parse_tiers(r#""[\"a\",\"b\"]""#).unwrap(), expected);
        assert_eq!(
            format_tiers(&parse_tiers(r#""[\"a\", \"b\"]""#).unwrap()).unwrap(),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn non_array_values_are_rejected() {
        for bad in [r#"{"a":1}"#, "free", "42", r#"[1,2]"#, r#""not json""#, "[\"a\""] {
            assert!(
                matches!(parse_tiers(bad), Err(Error::Serialization { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_list_formats_as_brackets() {
        assert_eq!(format_tiers(&[]).unwrap(), "[]");
    }

    #[test]
    fn add_is_idempotent() {
        let mut tiers = names(&["free"]);
        assert!(add_tier(&mut tiers, "premium"));
        assert!(!add_tier(&mut tiers, "premium"));
        assert_eq!(tiers, names(&["free", "premium"]));
    }

    #[test]
    fn remove_preserves_order_of_remaining() {
        let mut tiers = names(&["a", "b", "c", "d"]);
        assert!(remove_tier(&mut tiers, "b"));
        assert_eq!(tiers, names(&["a", "c", "d"]));
        assert!(!remove_tier(&mut tiers, "b"));
        assert_eq!(tiers, names(&["a", "c", "d"]));
    }
}
