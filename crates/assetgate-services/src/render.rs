//! Path rendering
//!
//! Patterns are plain strings with `{name}` tokens. A chain renders parent
//! first; pattern strings are authored to be directly concatenable, so no
//! separator is inserted between nodes.

use std::collections::BTreeMap;

use assetgate_core::models::UrlType;
use assetgate_core::{AppError, AppResult, ProviderName, ScopeType};

use crate::registry::DefinitionChain;

/// A piece of a parsed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Token(&'a str),
}

/// Split a pattern into literals and tokens.
///
/// Fails on unbalanced braces, nested braces and empty token names.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        match rest.find(['{', '}']) {
            None => {
                segments.push(Segment::Literal(rest));
                break;
            }
            Some(idx) if rest.as_bytes()[idx] == b'}' => {
                return Err(format!("unmatched '}}' in pattern '{}'", pattern));
            }
            Some(idx) => {
                if idx > 0 {
                    segments.push(Segment::Literal(&rest[..idx]));
                }
                let after = &rest[idx + 1..];
                let close = after
                    .find(['{', '}'])
                    .filter(|&end| after.as_bytes()[end] == b'}')
                    .ok_or_else(|| format!("unclosed '{{' in pattern '{}'", pattern))?;
                let name = &after[..close];
                if name.trim().is_empty() {
                    return Err(format!("empty token in pattern '{}'", pattern));
                }
                segments.push(Segment::Token(name));
                rest = &after[close + 1..];
            }
        }
    }

    Ok(segments)
}

/// Token names referenced by a pattern, in order of appearance.
pub fn pattern_tokens(pattern: &str) -> Result<Vec<&str>, String> {
    Ok(parse_pattern(pattern)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Token(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// A rendered path and how it is meant to be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPath {
    pub path: String,
    pub url_type: UrlType,
}

/// Fail with `ScopeNotSupported` unless every node of the chain allows `scope`.
pub fn ensure_scope_allowed(chain: &DefinitionChain, scope: ScopeType) -> AppResult<()> {
    if chain.nodes().iter().all(|node| node.allows_scope(scope)) {
        Ok(())
    } else {
        Err(AppError::ScopeNotSupported {
            definition: chain.name().to_string(),
            scope,
            provider: None,
        })
    }
}

/// Render the chain for `provider` and `scope` from resolved parameter values.
pub fn render(
    chain: &DefinitionChain,
    scope: ScopeType,
    provider: ProviderName,
    values: &BTreeMap<String, String>,
) -> AppResult<RenderedPath> {
    ensure_scope_allowed(chain, scope)?;

    let mut path = String::new();
    let mut url_type = UrlType::Signed;

    for node in chain.nodes() {
        let pattern =
            node.pattern(provider, scope)
                .ok_or_else(|| AppError::ScopeNotSupported {
                    definition: chain.name().to_string(),
                    scope,
                    provider: Some(provider),
                })?;

        let segments = parse_pattern(&pattern.pattern).map_err(|reason| {
            AppError::InvalidDefinition {
                definition: node.name.clone(),
                reason,
            }
        })?;

        for segment in segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Token(token) => match values.get(token) {
                    Some(value) => path.push_str(value),
                    None => {
                        tracing::error!(
                            definition = %node.name,
                            token = %token,
                            provider = %provider,
                            scope = %scope,
                            "Pattern token has no resolved value"
                        );
                        return Err(AppError::UnresolvedToken {
                            definition: node.name.clone(),
                            token: token.to_string(),
                        });
                    }
                },
            }
        }
        url_type = pattern.url_type;
    }

    if path.is_empty() {
        return Err(AppError::EmptyResolvedPath(chain.name().to_string()));
    }

    Ok(RenderedPath { path, url_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefinitionRegistry;
    use assetgate_core::models::{ParameterDefinition, PathDefinition, PathPattern};

    #[test]
    fn parses_literals_and_tokens() {
        let segments = parse_pattern("a/{x}.{y}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("a/"),
                Segment::Token("x"),
                Segment::Literal("."),
                Segment::Token("y"),
            ]
        );
        assert_eq!(pattern_tokens("{a}{b}/").unwrap(), vec!["a", "b"]);
        assert!(parse_pattern("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(parse_pattern("a/{x").is_err());
        assert!(parse_pattern("a/x}").is_err());
        assert!(parse_pattern("a/{}").is_err());
        assert!(parse_pattern("a/{x{y}}").is_err());
    }

    fn registry() -> DefinitionRegistry {
        let registry = DefinitionRegistry::new();
        registry
            .register(
                PathDefinition::new("icons", "Icons")
                    .with_scopes(&[ScopeType::Global, ScopeType::App])
                    .with_parameter(ParameterDefinition::new("env", "Environment"))
                    .with_pattern(
                        ProviderName::R2,
                        ScopeType::Global,
                        PathPattern::signed("{env}/icons/"),
                    )
                    .with_child(
                        PathDefinition::new("icon", "Icon")
                            .with_scopes(&[ScopeType::Global, ScopeType::App])
                            .with_parameter(ParameterDefinition::new("id", "Icon id"))
                            .with_pattern(
                                ProviderName::R2,
                                ScopeType::Global,
                                PathPattern::public("{id}.png"),
                            ),
                    ),
            )
            .unwrap();
        registry
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn child_renders_after_parent() {
        let registry = registry();
        let values = values(&[("env", "dev"), ("id", "abc")]);

        let parent = render(
            &registry.lookup("icons").unwrap(),
            ScopeType::Global,
            ProviderName::R2,
            &values,
        )
        .unwrap();
        let child = render(
            &registry.lookup("icon").unwrap(),
            ScopeType::Global,
            ProviderName::R2,
            &values,
        )
        .unwrap();

        assert_eq!(parent.path, "dev/icons/");
        assert_eq!(child.path, format!("{}{}", parent.path, "abc.png"));
        assert_eq!(parent.url_type, UrlType::Signed);
        assert_eq!(child.url_type, UrlType::Public);
    }

    #[test]
    fn missing_pattern_is_scope_not_supported() {
        let registry = registry();
        let chain = registry.lookup("icon").unwrap();
        let values = values(&[("env", "dev"), ("id", "abc")]);

        let err = render(&chain, ScopeType::App, ProviderName::R2, &values).unwrap_err();
        assert!(matches!(
            err,
            AppError::ScopeNotSupported {
                provider: Some(ProviderName::R2),
                ..
            }
        ));

        let err = render(&chain, ScopeType::ClientApp, ProviderName::R2, &values).unwrap_err();
        assert!(matches!(
            err,
            AppError::ScopeNotSupported { provider: None, .. }
        ));
    }

    #[test]
    fn missing_value_is_unresolved_token() {
        let registry = registry();
        let err = render(
            &registry.lookup("icon").unwrap(),
            ScopeType::Global,
            ProviderName::R2,
            &values(&[("env", "dev")]),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::UnresolvedToken { ref token, .. } if token == "id"));
    }
}
