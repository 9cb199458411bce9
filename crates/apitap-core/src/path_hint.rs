//! Route template normalization.
//!
//! Converts framework-specific route templates (`:id`, `*action`,
//! `{id:[0-9]+}`) into the canonical `{name}` placeholder form used in
//! exchange records. Unrecognized syntax passes through unchanged, which
//! makes the function idempotent on already-canonical templates.

use regex::{Captures, Regex};
use std::sync::OnceLock;

static VAR_MATCHER: OnceLock<Regex> = OnceLock::new();

fn var_matcher() -> &'static Regex {
    VAR_MATCHER.get_or_init(|| {
        Regex::new(r"(\{(.*?:*.*?)\}|:(.+?)/|:(.*)|\*(.+)|\*)")
            .expect("route template pattern is valid")
    })
}

/// Normalize a router path template to canonical `{name}` placeholder form.
///
/// Handles brace placeholders with constraints (`{id:[0-9]+}` becomes
/// `{id}`), colon segments (`:id` becomes `{id}`), named wildcards
/// (`*action` becomes `{action}`) and bare trailing wildcards (`*` becomes
/// `{wildcard}`). Anything else is returned unchanged.
pub fn normalize(path_hint: &str) -> String {
    var_matcher()
        .replace_all(path_hint, |caps: &Captures<'_>| {
            let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());

            if group(0) == "*" {
                return "{wildcard}".to_string();
            }
            if !group(2).is_empty() {
                // Brace placeholder; strip any regex constraint after the colon.
                let name = group(2).split(':').next().unwrap_or("");
                return format!("{{{name}}}");
            }
            if !group(3).is_empty() {
                return format!("{{{}}}/", group(3));
            }
            if !group(4).is_empty() {
                return format!("{{{}}}", group(4));
            }
            format!("{{{}}}", group(5))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_path_hints() {
        let cases = [
            // gorilla-style constraint placeholders
            (
                "/user/{id}/account/{accountID:[0-9]+}",
                "/user/{id}/account/{accountID}",
            ),
            // bare trailing wildcard
            ("/user/{id}/account/*", "/user/{id}/account/{wildcard}"),
            // named wildcard
            ("/user/{id}/account/*action", "/user/{id}/account/{action}"),
            // colon segment at end of template
            ("/user/:id", "/user/{id}"),
            // colon segment mid-template plus named wildcard
            ("/user/:id/account/*action", "/user/{id}/account/{action}"),
            // unknown syntax passes through
            (
                "/user/<id>/account/<accountID>",
                "/user/<id>/account/<accountID>",
            ),
        ];

        for (input, want) in cases {
            assert_eq!(normalize(input), want, "input: {input}");
        }
    }

    #[test]
    fn test_normalize_plain_path_unchanged() {
        assert_eq!(normalize("/health"), "/health");
        assert_eq!(normalize(""), "");
    }

    proptest! {
        // Canonical templates are fixpoints: segments made of literals and
        // `{name}` placeholders come back unchanged.
        #[test]
        fn prop_canonical_templates_are_fixpoints(
            template in r"(/([a-z][a-z0-9]{0,7}|\{[a-z][a-z0-9]{0,7}\})){1,4}",
        ) {
            prop_assert_eq!(normalize(&template), template.clone());
            prop_assert_eq!(normalize(&normalize(&template)), template);
        }
    }
}
