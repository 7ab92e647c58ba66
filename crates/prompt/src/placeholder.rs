//! Placeholder resolution.
//!
//! Recognized syntax, outside fenced code blocks:
//! - `$NAME` and `${NAME}`, where `NAME` is `[A-Z][A-Z0-9_]*`
//! - `${NAME:-default}` declares an inline default
//! - `$$` (the shell's process id) is left as written and never starts a
//!   token, so `$$PID` is not a reference to `PID`
//!
//! A token with no caller value and no default is an error; the literal token
//! text is never passed through to an agent.

use crate::markdown;
use crate::types::PlaceholderToken;
use conductor_core::{AppError, AppResult};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// Conventional catch-all token for the caller's argument blob.
pub const ARGUMENTS: &str = "ARGUMENTS";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Z][A-Z0-9_]*)(?::-([^}]*))?\}|\$([A-Z][A-Z0-9_]*)")
        .expect("Invalid placeholder regex")
});

enum Occurrence<'t> {
    DoubleDollar,
    Token {
        name: &'t str,
        default: Option<&'t str>,
    },
}

fn classify<'t>(caps: &Captures<'t>) -> Occurrence<'t> {
    if let Some(name) = caps.get(1) {
        Occurrence::Token {
            name: name.as_str(),
            default: caps.get(2).map(|d| d.as_str()),
        }
    } else if let Some(name) = caps.get(3) {
        Occurrence::Token {
            name: name.as_str(),
            default: None,
        }
    } else {
        Occurrence::DoubleDollar
    }
}

/// List the tokens referenced in `text`, in order of first appearance.
///
/// Fails with `AmbiguousPlaceholder` when one token declares two different
/// inline defaults.
pub fn scan_tokens(text: &str) -> AppResult<Vec<PlaceholderToken>> {
    let mut tokens: Vec<PlaceholderToken> = Vec::new();

    for line in markdown::lines(text).into_iter().filter(|l| !l.fenced) {
        for caps in TOKEN_RE.captures_iter(line.raw) {
            let Occurrence::Token { name, default } = classify(&caps) else {
                continue;
            };
            let position = line.offset + caps.get(0).map(|m| m.start()).unwrap_or(0);

            match tokens.iter_mut().find(|t| t.name == name) {
                Some(token) => {
                    token.positions.push(position);
                    match (&token.default, default) {
                        (Some(existing), Some(new)) if existing != new => {
                            return Err(AppError::AmbiguousPlaceholder {
                                token: name.to_string(),
                                first: existing.clone(),
                                second: new.to_string(),
                            });
                        }
                        (None, Some(new)) => token.default = Some(new.to_string()),
                        _ => {}
                    }
                }
                None => tokens.push(PlaceholderToken {
                    name: name.to_string(),
                    default: default.map(str::to_string),
                    positions: vec![position],
                }),
            }
        }
    }

    Ok(tokens)
}

/// Substitute every token in `text`.
///
/// Lookup order: caller `values`, then the token's inline default, then the
/// document-level `defaults`. Substituted values are not rescanned.
pub fn resolve(
    text: &str,
    values: &HashMap<String, String>,
    defaults: &BTreeMap<String, String>,
) -> AppResult<String> {
    let tokens = scan_tokens(text)?;
    if tokens.is_empty() {
        return Ok(text.to_string());
    }

    let mut resolved: HashMap<&str, &str> = HashMap::new();
    for token in &tokens {
        let value = values
            .get(&token.name)
            .or(token.default.as_ref())
            .or_else(|| defaults.get(&token.name))
            .ok_or_else(|| AppError::UnresolvedPlaceholder {
                token: token.name.clone(),
            })?;
        resolved.insert(token.name.as_str(), value.as_str());
    }

    let mut output = String::with_capacity(text.len());
    for line in markdown::lines(text) {
        if line.fenced {
            output.push_str(line.raw);
            continue;
        }

        let mut last = 0;
        for caps in TOKEN_RE.captures_iter(line.raw) {
            let Some(whole) = caps.get(0) else { continue };
            output.push_str(&line.raw[last..whole.start()]);
            match classify(&caps) {
                Occurrence::DoubleDollar => output.push_str(whole.as_str()),
                Occurrence::Token { name, .. } => {
                    output.push_str(resolved.get(name).copied().unwrap_or_default())
                }
            }
            last = whole.end();
        }
        output.push_str(&line.raw[last..]);
    }

    tracing::trace!("Resolved {} placeholder(s)", tokens.len());

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_tokens(text: &str) -> bool {
        scan_tokens(text).map(|t| !t.is_empty()).unwrap_or(true)
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_substitution() {
        let out = resolve("Phase 1: do $X", &values(&[("X", "build")]), &BTreeMap::new()).unwrap();
        assert_eq!(out, "Phase 1: do build");
    }

    #[test]
    fn test_braced_and_default() {
        let text = "Root: ${PROJECT_ROOT}, env: ${ENV:-staging}";
        let out = resolve(text, &values(&[("PROJECT_ROOT", "/srv/app")]), &BTreeMap::new()).unwrap();
        assert_eq!(out, "Root: /srv/app, env: staging");
    }

    #[test]
    fn test_caller_value_beats_default() {
        let out = resolve("${ENV:-staging}", &values(&[("ENV", "prod")]), &BTreeMap::new()).unwrap();
        assert_eq!(out, "prod");
    }

    #[test]
    fn test_document_default_applies_last() {
        let mut defaults = BTreeMap::new();
        defaults.insert("TARGET".to_string(), "src/".to_string());
        let out = resolve("Scan $TARGET", &HashMap::new(), &defaults).unwrap();
        assert_eq!(out, "Scan src/");
    }

    #[test]
    fn test_unresolved_token_fails() {
        let result = resolve("Implement $ARGUMENTS", &HashMap::new(), &BTreeMap::new());
        match result {
            Err(AppError::UnresolvedPlaceholder { token }) => assert_eq!(token, "ARGUMENTS"),
            other => panic!("expected UnresolvedPlaceholder, got {:?}", other),
        }
    }

    #[test]
    fn test_text_without_tokens_is_identity() {
        let text = "No tokens here, only $5 and $lowercase and a ${lower} brace.";
        assert!(!has_tokens(text));
        let out = resolve(text, &HashMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_resolving_twice_is_a_no_op() {
        let once = resolve("Deploy $SERVICE", &values(&[("SERVICE", "api")]), &BTreeMap::new()).unwrap();
        let twice = resolve(&once, &HashMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_double_dollar_is_left_alone() {
        let text = "Price is $$5 and run `kill $$PID` for $TARGET";
        let tokens = scan_tokens(text).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].name, "TARGET");

        let out = resolve(text, &values(&[("TARGET", "api")]), &BTreeMap::new()).unwrap();
        assert_eq!(out, "Price is $$5 and run `kill $$PID` for api");
        assert_eq!(resolve(&out, &HashMap::new(), &BTreeMap::new()).unwrap(), out);
    }

    #[test]
    fn test_token_free_text_resolves_to_itself() {
        let samples = [
            "",
            "plain prose",
            "Price is $$5",
            "run `kill $$PID`",
            "$$$$",
            "$ and $$ and $5 and ${lower}",
            "```sh
echo $HOME
```
",
        ];
        for text in samples {
            assert!(scan_tokens(text).unwrap().is_empty(), "{:?}", text);
            assert_eq!(resolve(text, &HashMap::new(), &BTreeMap::new()).unwrap(), text);
        }
    }

    #[test]
    fn test_fenced_code_is_untouched() {
        let text = "Target: $TARGET\n```bash\necho $HOME ${PATH}\n```\n";
        let out = resolve(text, &values(&[("TARGET", "api")]), &BTreeMap::new()).unwrap();
        assert_eq!(out, "Target: api\n```bash\necho $HOME ${PATH}\n```\n");
    }

    #[test]
    fn test_complete_resolution_leaves_no_tokens() {
        let text = "$A then ${B} then ${C:-c}";
        let out = resolve(text, &values(&[("A", "a"), ("B", "b")]), &BTreeMap::new()).unwrap();
        assert!(!has_tokens(&out));
        assert_eq!(out, "a then b then c");
    }

    #[test]
    fn test_scan_tokens_positions() {
        let tokens = scan_tokens("$A and $A\nthen ${B:-x}").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].name, "A");
        assert_eq!(tokens[0].positions, vec![0, 7]);
        assert_eq!(tokens[1].default.as_deref(), Some("x"));
        assert_eq!(tokens[1].positions, vec![15]);
    }

    #[test]
    fn test_conflicting_defaults_are_ambiguous() {
        let result = scan_tokens("${MODE:-fast} and ${MODE:-thorough}");
        assert!(matches!(result, Err(AppError::AmbiguousPlaceholder { .. })));
    }

    #[test]
    fn test_repeated_identical_default_is_fine() {
        let tokens = scan_tokens("${MODE:-fast} and ${MODE:-fast} and $MODE").unwrap();
        assert_eq!(tokens[0].positions.len(), 3);
    }
}
