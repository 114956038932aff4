use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `{{ env.NAME }}` with an optional `| default("value")` suffix
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// Expansion happens before deserialization so config structs only ever see
/// plain strings. Comment lines are left untouched, so a commented-out
/// reference to an unset variable does not fail the load.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }

        let mut failure = None;
        let expanded = PLACEHOLDER.replace_all(line, |captures: &Captures<'_>| {
            resolve(captures).unwrap_or_else(|e| {
                failure.get_or_insert(e);
                String::new()
            })
        });

        if let Some(e) = failure {
            return Err(e);
        }

        lines.push(expanded.into_owned());
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = &captures[1];
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "path = \"claude\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_variable() {
        temp_env::with_var("BRIDGE_TEST_CLI", Some("/usr/local/bin/claude"), || {
            let result = expand_env("path = \"{{ env.BRIDGE_TEST_CLI }}\"").unwrap();
            assert_eq!(result, "path = \"/usr/local/bin/claude\"");
        });
    }

    #[test]
    fn expands_several_variables_across_lines() {
        let vars = [("BRIDGE_TEST_A", Some("a")), ("BRIDGE_TEST_B", Some("b"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("x = \"{{ env.BRIDGE_TEST_A }}-{{ env.BRIDGE_TEST_B }}\"\ny = 1").unwrap();
            assert_eq!(result, "x = \"a-b\"\ny = 1");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("BRIDGE_TEST_MISSING", || {
            let err = expand_env("cwd = \"{{ env.BRIDGE_TEST_MISSING }}\"").unwrap_err();
            assert!(err.contains("BRIDGE_TEST_MISSING"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("BRIDGE_TEST_OPTIONAL", || {
            let result = expand_env("mode = \"{{ env.BRIDGE_TEST_OPTIONAL | default(\"plan\") }}\"").unwrap();
            assert_eq!(result, "mode = \"plan\"");
        });

        temp_env::with_var("BRIDGE_TEST_OPTIONAL", Some("default"), || {
            let result = expand_env("mode = \"{{ env.BRIDGE_TEST_OPTIONAL | default(\"plan\") }}\"").unwrap();
            assert_eq!(result, "mode = \"default\"");
        });
    }

    #[test]
    fn rejects_other_scopes() {
        let err = expand_env("x = \"{{ secrets.TOKEN }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));

        let err = expand_env("x = \"{{ env.A.B }}\"").unwrap_err();
        assert!(err.contains("env.A.B"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("BRIDGE_TEST_MISSING", || {
            let input = "  # cwd = \"{{ env.BRIDGE_TEST_MISSING }}\"\n";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
