//! Config YAML parsing with environment variable substitution

use super::types::AppConfig;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` references with environment values.
///
/// Every missing variable is reported in one error.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();

    let substituted = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(Error::Config(format!(
            "Missing environment variable(s): {}",
            missing.join(", ")
        )));
    }

    Ok(substituted.into_owned())
}

/// Parse a config document (after env var substitution). No semantic checks.
pub fn parse_config_str(yaml: &str) -> Result<AppConfig> {
    let substituted = substitute_env_vars(yaml)?;
    serde_yaml::from_str(&substituted)
        .map_err(|e| Error::Config(format!("Failed to parse config YAML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CPAI_EXHOOK_TEST_HOST", "10.1.2.3");
        let result = substitute_env_vars("host: ${CPAI_EXHOOK_TEST_HOST}\nport: 32168").unwrap();
        assert_eq!(result, "host: 10.1.2.3\nport: 32168");
        std::env::remove_var("CPAI_EXHOOK_TEST_HOST");
    }

    #[test]
    fn test_missing_env_vars_reported_together() {
        let err = substitute_env_vars("a: ${CPAI_EXHOOK_MISSING_B}\nb: ${CPAI_EXHOOK_MISSING_A}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("CPAI_EXHOOK_MISSING_A, CPAI_EXHOOK_MISSING_B"));
    }

    #[test]
    fn test_no_vars_passthrough() {
        let input = "frigate: http://frigate:5000";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = parse_config_str("frigate: [unterminated").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
