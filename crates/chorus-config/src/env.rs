use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Failure while expanding `{{ env.VAR }}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    /// Referenced variable is unset and no default was given
    #[error("environment variable not found: `{0}`")]
    MissingVariable(String),
    /// Placeholder used a scope other than `env.`
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{ env.VAR }}` or `{{ env.VAR | default("fallback") }}`
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("must be valid regex")
    })
}

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// Comment lines are passed through untouched so a commented-out secret
/// never has to be present in the environment.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, ExpandError> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |captures: &Captures<'_>| {
        match resolve(captures) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(captures: &Captures<'_>) -> Result<String, ExpandError> {
    let key = &captures[1];
    let default_value = captures.get(2).map(|m| m.as_str());

    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(ExpandError::UnsupportedScope(key.to_owned()));
    };

    std::env::var(var_name).or_else(|_| {
        default_value
            .map(str::to_owned)
            .ok_or_else(|| ExpandError::MissingVariable(var_name.to_owned()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[server]\nrelay_path = \"/api\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_provider_keys() {
        let vars = [("CHORUS_OPENAI_KEY", Some("sk-openai")), ("CHORUS_DIFY_KEY", Some("app-dify"))];
        temp_env::with_vars(vars, || {
            let input = "[providers.openai]\napi_key = \"{{ env.CHORUS_OPENAI_KEY }}\"\n\
                         [providers.dify]\napi_key = \"{{env.CHORUS_DIFY_KEY}}\"";
            let result = expand_env(input).unwrap();
            assert_eq!(
                result,
                "[providers.openai]\napi_key = \"sk-openai\"\n[providers.dify]\napi_key = \"app-dify\""
            );
        });
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        temp_env::with_var_unset("CHORUS_MISSING", || {
            let err = expand_env("api_key = \"{{ env.CHORUS_MISSING }}\"").unwrap_err();
            assert_eq!(err, ExpandError::MissingVariable("CHORUS_MISSING".to_owned()));
        });
    }

    #[test]
    fn other_scopes_are_rejected() {
        let err = expand_env("api_key = \"{{ vault.KEY }}\"").unwrap_err();
        assert!(matches!(err, ExpandError::UnsupportedScope(key) if key == "vault.KEY"));
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("CHORUS_MISSING", || {
            let input = "  # api_key = \"{{ env.CHORUS_MISSING }}\"\nmodel = \"gpt-4o\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("CHORUS_OPTIONAL", || {
            let result = expand_env("base_url = \"{{ env.CHORUS_OPTIONAL | default(\"http://localhost\") }}\"");
            assert_eq!(result.unwrap(), "base_url = \"http://localhost\"");
        });

        temp_env::with_var("CHORUS_OPTIONAL", Some("http://proxy"), || {
            let result = expand_env("base_url = \"{{ env.CHORUS_OPTIONAL | default(\"http://localhost\") }}\"");
            assert_eq!(result.unwrap(), "base_url = \"http://proxy\"");
        });
    }

    #[test]
    fn empty_default_is_allowed() {
        temp_env::with_var_unset("CHORUS_ORG", || {
            let result = expand_env("organization_id = \"{{ env.CHORUS_ORG | default(\"\") }}\"").unwrap();
            assert_eq!(result, "organization_id = \"\"");
        });
    }
}
