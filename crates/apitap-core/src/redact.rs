//! Regex-based JSON body field masking.
//!
//! Masks named fields in a JSON text body without parsing it into a tree.
//! A field name matches at any nesting depth; every occurrence of that name
//! is masked identically. Only the captured value span is rewritten, so the
//! surrounding punctuation and whitespace survive byte for byte.

use regex::{Captures, Regex};
use std::collections::BTreeMap;

// Value patterns: group 1 is the field prefix (`"name": `), group 2 the
// value span, group 3 the trailing punctuation. String values honor escaped
// quotes; number values cover optional sign and decimals.
const STRING_FIELD_MATCH: &str = r#"("{field}": *)(".*?[^\\]")( *[, \n\r}]?)"#;
const NUMBER_FIELD_MATCH: &str = r#"("{field}": *)(-?[0-9]+\.?[0-9]*)( *[, \n\r}]?)"#;

/// Mask matching fields in a JSON-ish text body.
///
/// Bodies whose media type is not `application/json` (parameters such as
/// `charset` are ignored) pass through unchanged. String masks are written
/// back quoted; number masks are written back bare, so masked JSON stays
/// parseable. Each configured field applies as an independent pass over the
/// text, in key order.
pub fn mask_body(
    body: &str,
    mime_type: &str,
    string_masks: &BTreeMap<String, String>,
    number_masks: &BTreeMap<String, String>,
) -> String {
    let media_type = mime_type.split(';').next().unwrap_or("").trim();
    if !media_type.eq_ignore_ascii_case("application/json") {
        return body.to_string();
    }

    let mut body = body.to_string();

    for (field, mask) in string_masks {
        let Some(re) = field_pattern(STRING_FIELD_MATCH, field) else {
            continue;
        };
        body = re
            .replace_all(&body, |caps: &Captures<'_>| {
                let prefix = caps.get(1).map_or("", |m| m.as_str());
                let suffix = caps.get(3).map_or("", |m| m.as_str());
                format!("{prefix}\"{mask}\"{suffix}")
            })
            .into_owned();
    }

    for (field, mask) in number_masks {
        let Some(re) = field_pattern(NUMBER_FIELD_MATCH, field) else {
            continue;
        };
        body = re
            .replace_all(&body, |caps: &Captures<'_>| {
                let prefix = caps.get(1).map_or("", |m| m.as_str());
                let suffix = caps.get(3).map_or("", |m| m.as_str());
                format!("{prefix}{mask}{suffix}")
            })
            .into_owned();
    }

    body
}

/// Compile the value pattern for one field, escaping the field name so
/// special characters match literally. A field whose pattern fails to
/// compile is logged and skipped; other fields still apply.
fn field_pattern(template: &str, field: &str) -> Option<Regex> {
    let pattern = template.replace("{field}", &regex::escape(field));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(error) => {
            tracing::warn!(field = %field, error = %error, "skipping unmatchable body field mask");
            None
        }
    }
}
