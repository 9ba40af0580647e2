//! A string-like wrapper that expands `{{ env.VAR_NAME }}` placeholders against the
//! process environment, then parses the expanded text into `T`.
//!
//! Intended for configuration values that should support either a literal value or a
//! reference to an environment variable, e.g. an API key in a TOML file:
//!
//! ```toml
//! api_key = "{{ env.OPENAI_API_KEY }}"
//! ```

use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use serde_with::DeserializeAs;

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"))
}

/// Error returned when a `{{ env.VAR }}` placeholder references an unset variable or
/// the expanded text fails to parse into `T`.
#[derive(Debug, thiserror::Error)]
pub enum DynamicStringError<E> {
    /// An environment variable referenced by the string was not set.
    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),
    /// The expanded text could not be parsed into the target type.
    #[error("failed to parse expanded value: {0}")]
    Parse(E),
}

/// A value deserialized from a string after expanding any `{{ env.VAR }}` placeholders
/// it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicString<T>(T);

impl<T> DynamicString<T> {
    /// Unwraps the parsed, expanded value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for DynamicString<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Expands every `{{ env.VAR }}` placeholder in `input` against the process
/// environment, leaving everything else untouched.
pub fn expand(input: &str) -> Result<String, String> {
    let mut missing = None;

    let expanded = placeholder_pattern().replace_all(input, |caps: &regex::Captures<'_>| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(var),
        None => Ok(expanded.into_owned()),
    }
}

impl<T> FromStr for DynamicString<T>
where
    T: FromStr,
{
    type Err = DynamicStringError<T::Err>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expanded = expand(s).map_err(DynamicStringError::MissingEnvVar)?;
        let value = expanded.parse::<T>().map_err(DynamicStringError::Parse)?;

        Ok(Self(value))
    }
}

impl<'de, T> Deserialize<'de> for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_str(&raw).map_err(de::Error::custom)
    }
}

/// Lets `DynamicString<T>` be used with `serde_with`'s `#[serde_as]` attribute to
/// expand-and-parse a field in place, producing a plain `T` rather than the wrapper.
impl<'de, T> DeserializeAs<'de, T> for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize_as<D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
    {
        DynamicString::<T>::deserialize(deserializer).map(DynamicString::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_var() {
        temp_env::with_var("DYNAMIC_STRING_TEST_VAR", Some("hello"), || {
            let out = DynamicString::<String>::from_str("{{ env.DYNAMIC_STRING_TEST_VAR }}").unwrap();
            assert_eq!(out.into_inner(), "hello");
        });
    }

    #[test]
    fn passes_through_literal() {
        let out = DynamicString::<String>::from_str("literal-value").unwrap();
        assert_eq!(out.into_inner(), "literal-value");
    }

    #[test]
    fn expands_inline_within_surrounding_text() {
        temp_env::with_var("DYNAMIC_STRING_TEST_HOST", Some("example.com"), || {
            let out = DynamicString::<String>::from_str("https://{{ env.DYNAMIC_STRING_TEST_HOST }}/v1").unwrap();
            assert_eq!(out.into_inner(), "https://example.com/v1");
        });
    }

    #[test]
    fn missing_var_errors() {
        temp_env::with_var_unset("DYNAMIC_STRING_TEST_MISSING", || {
            let err = DynamicString::<String>::from_str("{{ env.DYNAMIC_STRING_TEST_MISSING }}").unwrap_err();
            assert!(matches!(err, DynamicStringError::MissingEnvVar(_)));
        });
    }

    #[test]
    fn parses_into_target_type() {
        let out = DynamicString::<u16>::from_str("8080").unwrap();
        assert_eq!(out.into_inner(), 8080);
    }
}
