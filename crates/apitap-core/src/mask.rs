//! Mask registry types.
//!
//! A [`MaskSet`] holds the redaction rules registered for one exchange: nine
//! independent key-to-replacement maps plus the path-hint override and the
//! customer id. Maps are `BTreeMap` so masking passes and serialized mask
//! metadata come out in a deterministic order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default replacement for masked text values.
pub const DEFAULT_STRING_MASK: &str = "__masked__";

/// Default replacement for masked numeric values. A syntactically valid
/// number, so masked JSON stays parseable.
pub const DEFAULT_NUMBER_MASK: &str = "-12321";

/// Redaction rules for one exchange.
///
/// Created empty at request entry, mutated through the
/// [`Controller`](crate::Controller) while the handler runs, frozen the
/// instant the handler returns, and consumed exactly once when the record is
/// built.
#[derive(Debug, Clone, Default)]
pub struct MaskSet {
    pub(crate) query_string_masks: BTreeMap<String, String>,
    pub(crate) request_header_masks: BTreeMap<String, String>,
    pub(crate) request_cookie_masks: BTreeMap<String, String>,
    pub(crate) request_field_masks_string: BTreeMap<String, String>,
    pub(crate) request_field_masks_number: BTreeMap<String, String>,
    pub(crate) response_header_masks: BTreeMap<String, String>,
    pub(crate) response_cookie_masks: BTreeMap<String, String>,
    pub(crate) response_field_masks_string: BTreeMap<String, String>,
    pub(crate) response_field_masks_number: BTreeMap<String, String>,
    pub(crate) path_hint: Option<String>,
    pub(crate) customer_id: Option<String>,
}

impl MaskSet {
    /// Masked key names per category, values excluded. This is what leaves
    /// the process alongside the record; replacements never do.
    pub(crate) fn metadata(&self) -> MaskMetadata {
        fn keys(map: &BTreeMap<String, String>) -> Vec<String> {
            map.keys().cloned().collect()
        }

        MaskMetadata {
            query_string_masks: keys(&self.query_string_masks),
            request_header_masks: keys(&self.request_header_masks),
            request_cookie_masks: keys(&self.request_cookie_masks),
            request_field_masks_string: keys(&self.request_field_masks_string),
            request_field_masks_number: keys(&self.request_field_masks_number),
            response_header_masks: keys(&self.response_header_masks),
            response_cookie_masks: keys(&self.response_cookie_masks),
            response_field_masks_string: keys(&self.response_field_masks_string),
            response_field_masks_number: keys(&self.response_field_masks_number),
        }
    }
}

/// Names of the masked keys per category.
///
/// Shipped with each delivered exchange so the receiving side knows which
/// keys were redacted without ever seeing the replacement values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskMetadata {
    /// Masked query-string parameter names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_string_masks: Vec<String>,
    /// Masked request header names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_header_masks: Vec<String>,
    /// Masked request cookie names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_cookie_masks: Vec<String>,
    /// Masked request body string field names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_field_masks_string: Vec<String>,
    /// Masked request body number field names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_field_masks_number: Vec<String>,
    /// Masked response header names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_header_masks: Vec<String>,
    /// Masked response cookie names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_cookie_masks: Vec<String>,
    /// Masked response body string field names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_field_masks_string: Vec<String>,
    /// Masked response body number field names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_field_masks_number: Vec<String>,
}

/// Pair target keys with replacements.
///
/// One replacement applies to every key; N replacements pair positionally
/// with N keys; missing replacements fall back to the category default.
pub(crate) fn assign_masks(
    map: &mut BTreeMap<String, String>,
    keys: Vec<String>,
    masks: &[&str],
    default_mask: &str,
) {
    for (i, key) in keys.into_iter().enumerate() {
        let mask = if masks.len() == 1 {
            masks[0]
        } else if masks.len() > i {
            masks[i]
        } else {
            default_mask
        };
        map.insert(key, mask.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(keys: &[&str], masks: &[&str]) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        assign_masks(
            &mut map,
            keys.iter().map(|k| k.to_string()).collect(),
            masks,
            DEFAULT_STRING_MASK,
        );
        map
    }

    fn expect(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_single_key_default_mask() {
        assert_eq!(
            assign(&["test"], &[]),
            expect(&[("test", DEFAULT_STRING_MASK)])
        );
    }

    #[test]
    fn test_single_key_custom_mask() {
        assert_eq!(assign(&["test"], &["testmask"]), expect(&[("test", "testmask")]));
    }

    #[test]
    fn test_multiple_keys_default_mask() {
        assert_eq!(
            assign(&["test", "test2", "test3"], &[]),
            expect(&[
                ("test", DEFAULT_STRING_MASK),
                ("test2", DEFAULT_STRING_MASK),
                ("test3", DEFAULT_STRING_MASK),
            ])
        );
    }

    #[test]
    fn test_multiple_keys_single_mask_applies_to_all() {
        assert_eq!(
            assign(&["test", "test2", "test3"], &["testmask"]),
            expect(&[
                ("test", "testmask"),
                ("test2", "testmask"),
                ("test3", "testmask"),
            ])
        );
    }

    #[test]
    fn test_multiple_keys_matched_masks_pair_positionally() {
        assert_eq!(
            assign(&["test", "test2", "test3"], &["testmask", "test2mask", "test3mask"]),
            expect(&[
                ("test", "testmask"),
                ("test2", "test2mask"),
                ("test3", "test3mask"),
            ])
        );
    }

    #[test]
    fn test_multiple_keys_short_masks_fall_back_to_default() {
        assert_eq!(
            assign(&["test", "test2", "test3"], &["testmask", "test2mask"]),
            expect(&[
                ("test", "testmask"),
                ("test2", "test2mask"),
                ("test3", DEFAULT_STRING_MASK),
            ])
        );
    }

    #[test]
    fn test_metadata_lists_keys_only() {
        let mut set = MaskSet::default();
        assign_masks(
            &mut set.request_header_masks,
            vec!["authorization".to_string(), "x-api-key".to_string()],
            &["secret-value"],
            DEFAULT_STRING_MASK,
        );
        set.customer_id = Some("cust-1".to_string());

        let meta = set.metadata();
        assert_eq!(
            meta.request_header_masks,
            vec!["authorization".to_string(), "x-api-key".to_string()]
        );
        assert!(meta.query_string_masks.is_empty());

        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("secret-value"));
        assert_eq!(json, "{\"requestHeaderMasks\":[\"authorization\",\"x-api-key\"]}");
    }
}
