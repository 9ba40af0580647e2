use std::{path::Path, str::FromStr};

use anyhow::bail;
use indoc::indoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use std::fmt::Write;
use toml::Value;

use crate::Config;

/// Load configuration from a TOML file, expanding `{{ env.VAR }}` placeholders and
/// validating the result.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_downstreams(&config)?;

    for warning in validate_rate_limits(&config)? {
        log::warn!("{warning}");
    }

    Ok(config)
}

/// Validates that the configuration exposes at least one functional surface.
pub(crate) fn validate_has_downstreams(config: &Config) -> anyhow::Result<()> {
    let has_llm_providers = config.llm.enabled() && config.llm.has_providers();
    let has_proxy = config.proxy.anthropic.enabled;

    if !has_llm_providers && !has_proxy {
        bail!(indoc! {r#"
            No downstream servers configured. The gateway requires at least one LLM
            provider or the Anthropic proxy to function.

            Example configuration:

              [llm.providers.openai]
              type = "openai"
              api_key = "{{ env.OPENAI_API_KEY }}"
        "#});
    }

    if has_llm_providers && !config.llm.has_protocol_endpoints() {
        bail!(indoc! {r#"
            LLM providers are configured but no protocol endpoints are enabled. At least one protocol endpoint must be enabled.

            Both protocols are enabled by default. To explicitly enable them in configuration:

              [llm.protocols.openai]
              enabled = true
              path = "/v1"

              [llm.protocols.anthropic]
              enabled = true
              path = "/anthropic"
        "#});
    }

    if config.llm.protocols.openai.enabled
        && config.llm.protocols.anthropic.enabled
        && config.llm.protocols.openai.path == config.llm.protocols.anthropic.path
    {
        bail!(
            "Duplicate LLM protocol endpoint path: OpenAI and Anthropic protocols cannot use the same path ({})",
            config.llm.protocols.openai.path
        );
    }

    for (name, rule) in config.router.routes.iter().enumerate() {
        if rule.pattern.trim().is_empty() {
            bail!("router.routes[{name}].pattern cannot be empty");
        }
    }

    Ok(())
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

/// Validates the rate limit configuration and returns warnings.
pub(crate) fn validate_rate_limits(config: &Config) -> anyhow::Result<Vec<String>> {
    let warnings = Vec::new();

    let has_llm_rate_limits = config
        .llm
        .providers
        .values()
        .any(|provider| provider.rate_limits().is_some() || provider.models().values().any(|m| m.rate_limits().is_some()));

    if !has_llm_rate_limits {
        return Ok(warnings);
    }

    if !config.server.client_identification.enabled {
        bail!(
            "LLM rate limits are configured but client identification is not enabled. \
             Enable client identification in [server.client_identification]"
        );
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        let err = validate_has_downstreams(&config).unwrap_err();
        assert!(err.to_string().contains("No downstream servers configured"));
    }

    #[test]
    fn accepts_loopback_provider() {
        let raw = indoc! {r#"
            [llm.providers.echo]
            type = "loopback"
        "#};

        let config: Config = toml::from_str(raw).unwrap();
        validate_has_downstreams(&config).unwrap();
    }

    #[test]
    fn rejects_rate_limits_without_client_identification() {
        let raw = indoc! {r#"
            [llm.providers.openai]
            type = "openai"
            api_key = "sk-test"

            [llm.providers.openai.rate_limits]
            requests_per_second = 10
        "#};

        let config: Config = toml::from_str(raw).unwrap();
        let err = validate_rate_limits(&config).unwrap_err();
        assert!(err.to_string().contains("client identification is not enabled"));
    }

    #[test]
    fn expands_env_var_placeholders() {
        temp_env::with_var("GATEWAY_TEST_KEY", Some("secret-value"), || {
            let raw = indoc! {r#"
                [llm.providers.openai]
                type = "openai"
                api_key = "{{ env.GATEWAY_TEST_KEY }}"
            "#};

            let mut value: Value = toml::from_str(raw).unwrap();
            expand_dynamic_strings(&mut Vec::new(), &mut value).unwrap();

            let api_key = value["llm"]["providers"]["openai"]["api_key"].as_str().unwrap();
            assert_eq!(api_key, "secret-value");
        });
    }
}
