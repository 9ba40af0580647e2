//! Applies declarative [`config::HeaderRule`]s to an outbound `reqwest` request,
//! given the headers of the inbound request that triggered it.

#![deny(missing_docs)]

use ascii::AsciiStr;
use config::{HeaderForward, HeaderInsert, HeaderRemove, HeaderRenameDuplicate, HeaderRule, NameOrPattern};
use reqwest::{
    RequestBuilder,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use std::str::FromStr;

/// Apply `rules`, in order, to `builder`. `inbound` is the set of headers the
/// client sent to the gateway; `Forward`/`RenameDuplicate` rules read from it.
///
/// Rules are applied in three passes so that ordering within the rule list only
/// matters for rules of the same kind: forwards and inserts and renames build up a
/// working header set first, then removes filter it, then the survivors are set on
/// the builder. This matches how the gateway's provider clients need header rules
/// to behave: a `remove` rule should win regardless of where it appears relative to
/// the `forward` it is meant to suppress.
pub fn apply(builder: RequestBuilder, inbound: &HeaderMap, rules: &[HeaderRule]) -> RequestBuilder {
    let mut working = HeaderMap::new();
    let mut removals: Vec<NameOrPattern> = Vec::new();

    for rule in rules {
        match rule {
            HeaderRule::Forward(forward) => apply_forward(&mut working, inbound, forward),
            HeaderRule::Insert(insert) => apply_insert(&mut working, insert),
            HeaderRule::RenameDuplicate(rename) => apply_rename_duplicate(&mut working, inbound, rename),
            HeaderRule::Remove(remove) => removals.push(remove.name.clone()),
        }
    }

    if !removals.is_empty() {
        working.retain(|name, _| !removals.iter().any(|pattern| matches(pattern, name.as_str())));
    }

    working.into_iter().fold(builder, |builder, (name, value)| match name {
        Some(name) => builder.header(name, value),
        None => builder,
    })
}

fn apply_forward(working: &mut HeaderMap, inbound: &HeaderMap, forward: &HeaderForward) {
    for (name, value) in inbound.iter().filter(|(name, _)| matches(&forward.name, name.as_str())) {
        let value = value.to_str().ok().or(forward.default.as_deref());

        let Some(value) = value else { continue };

        let Some(header_name) = forward
            .rename
            .as_deref()
            .or(Some(name.as_str()))
            .and_then(|name| HeaderName::from_str(name).ok())
        else {
            continue;
        };

        if let Some(value) = ascii_header_value(value) {
            working.insert(header_name, value);
        }
    }
}

fn apply_insert(working: &mut HeaderMap, insert: &HeaderInsert) {
    let Ok(name) = HeaderName::from_str(&insert.name) else {
        return;
    };

    if let Some(value) = ascii_header_value(&insert.value) {
        working.insert(name, value);
    }
}

fn apply_rename_duplicate(working: &mut HeaderMap, inbound: &HeaderMap, rename: &HeaderRenameDuplicate) {
    let value = inbound
        .get(&rename.name)
        .and_then(|value| value.to_str().ok())
        .or(rename.default.as_deref());

    let Some(value) = value else { return };
    let Ok(header_name) = HeaderName::from_str(&rename.rename) else {
        return;
    };

    if let Some(value) = ascii_header_value(value) {
        working.insert(header_name, value);
    }
}

fn matches(pattern: &NameOrPattern, candidate: &str) -> bool {
    match pattern {
        NameOrPattern::Name(name) => name.eq_ignore_ascii_case(candidate),
        NameOrPattern::Pattern(pattern) => pattern.is_match(candidate),
    }
}

/// Header values must be valid US-ASCII to become an HTTP header; reject anything
/// else up front rather than let `HeaderValue::from_str` fail silently deeper down.
fn ascii_header_value(value: &str) -> Option<HeaderValue> {
    let ascii = AsciiStr::from_ascii(value).ok()?;
    HeaderValue::from_str(ascii.as_str()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    fn builder() -> RequestBuilder {
        Client::new().get("https://example.com")
    }

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_str(name).unwrap(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn forward_copies_inbound_header() {
        let inbound = header_map(&[("x-request-id", "abc-123")]);
        let rules = vec![HeaderRule::Forward(HeaderForward {
            name: NameOrPattern::Name("x-request-id".to_string()),
            rename: None,
            default: None,
        })];

        let request = apply(builder(), &inbound, &rules).build().unwrap();
        assert_eq!(request.headers().get("x-request-id").unwrap(), "abc-123");
    }

    #[test]
    fn forward_uses_default_when_header_is_absent() {
        let inbound = HeaderMap::new();
        let rules = vec![HeaderRule::Forward(HeaderForward {
            name: NameOrPattern::Name("x-tenant".to_string()),
            rename: None,
            default: Some("default-tenant".to_string()),
        })];

        let request = apply(builder(), &inbound, &rules).build().unwrap();
        assert_eq!(request.headers().get("x-tenant").unwrap(), "default-tenant");
    }

    #[test]
    fn remove_wins_over_earlier_forward() {
        let inbound = header_map(&[("x-secret", "leaked")]);
        let rules = vec![
            HeaderRule::Forward(HeaderForward {
                name: NameOrPattern::Name("x-secret".to_string()),
                rename: None,
                default: None,
            }),
            HeaderRule::Remove(HeaderRemove {
                name: NameOrPattern::Name("x-secret".to_string()),
            }),
        ];

        let request = apply(builder(), &inbound, &rules).build().unwrap();
        assert!(request.headers().get("x-secret").is_none());
    }

    #[test]
    fn insert_sets_a_fixed_value() {
        let rules = vec![HeaderRule::Insert(HeaderInsert {
            name: "x-gateway".to_string(),
            value: "aperture".to_string(),
        })];

        let request = apply(builder(), &HeaderMap::new(), &rules).build().unwrap();
        assert_eq!(request.headers().get("x-gateway").unwrap(), "aperture");
    }
}
