//! Specification names: `"<lang>:/<escaped-name>"`, bare names being native.
//!
//! The language tag lets frameworks written in different languages share a
//! multicast group while only importing the contracts they can implement.

use std::collections::HashSet;

/// Language tag of specifications this node can import.
pub const DEFAULT_LANGUAGE: &str = "java";

const SEPARATOR: &str = ":/";

fn escape(name: &str) -> String {
    name.replace('/', "%2F")
}

fn unescape(name: &str) -> String {
    name.replace("%2F", "/")
}

fn is_language_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Splits a specification into `(language, name)`.
///
/// A bare name (no `lang:/` prefix) belongs to [`DEFAULT_LANGUAGE`] and is
/// returned untouched; a tagged name is unescaped.
pub fn parse_specification(spec: &str) -> (String, String) {
    if let Some((tag, rest)) = spec.split_once(SEPARATOR) {
        if is_language_tag(tag) {
            return (tag.to_string(), unescape(rest));
        }
    }
    (DEFAULT_LANGUAGE.to_string(), spec.to_string())
}

pub fn format_specification(language: &str, name: &str) -> String {
    format!("{language}{SEPARATOR}{}", escape(name))
}

/// Normalizes every specification to its tagged form, keeping order.
pub fn format_specifications<I, S>(specs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs
        .into_iter()
        .map(|spec| {
            let (language, name) = parse_specification(spec.as_ref());
            format_specification(&language, &name)
        })
        .collect()
}

/// Keeps the names of native-language specifications, deduplicated in order.
/// Specifications of other languages are dropped.
pub fn extract_specifications<I, S>(specs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    specs
        .into_iter()
        .filter_map(|spec| {
            let (language, name) = parse_specification(spec.as_ref());
            (language == DEFAULT_LANGUAGE).then_some(name)
        })
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
