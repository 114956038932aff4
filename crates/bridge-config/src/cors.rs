use std::time::Duration;

use serde::Deserialize;

/// CORS configuration
///
/// Browser clients of the messages endpoint usually come from arbitrary
/// origins, so every list defaults to the wildcard.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins
    #[serde(default)]
    pub origins: AnyOrArray,
    /// Allowed HTTP methods
    #[serde(default)]
    pub methods: AnyOrArray,
    /// Allowed request headers
    #[serde(default)]
    pub headers: AnyOrArray,
    /// Allow credentials
    #[serde(default)]
    pub credentials: bool,
    /// Max age for preflight cache in seconds
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl CorsConfig {
    /// Preflight cache lifetime
    pub fn max_age_duration(&self) -> Option<Duration> {
        self.max_age.map(Duration::from_secs)
    }
}

/// Either the wildcard `"*"` or an explicit list of values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnyOrArray {
    /// Match any value
    #[default]
    Any,
    /// Explicit list
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnyOrArray {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for AnyOrArray {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = match RawAnyOrArray::deserialize(deserializer)? {
            RawAnyOrArray::One(value) => vec![value],
            RawAnyOrArray::Many(values) => values,
        };

        if values.iter().any(|v| v == "*") {
            Ok(Self::Any)
        } else {
            Ok(Self::List(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_wildcards() {
        let config: CorsConfig = toml::from_str("").unwrap();
        assert_eq!(config.origins, AnyOrArray::Any);
        assert_eq!(config.methods, AnyOrArray::Any);
        assert!(!config.credentials);
        assert!(config.max_age_duration().is_none());
    }

    #[test]
    fn explicit_lists_and_wildcard_strings() {
        let config: CorsConfig = toml::from_str(
            r#"
            origins = ["https://app.example.com"]
            methods = "*"
            headers = ["content-type", "*"]
            max_age = 600
        "#,
        )
        .unwrap();

        assert_eq!(
            config.origins,
            AnyOrArray::List(vec!["https://app.example.com".to_owned()])
        );
        assert_eq!(config.methods, AnyOrArray::Any);
        assert_eq!(config.headers, AnyOrArray::Any);
        assert_eq!(config.max_age_duration(), Some(Duration::from_secs(600)));
    }
}
