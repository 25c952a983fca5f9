//! Parameter resolution
//!
//! Each parameter of the chain takes, in order: the supplied value, the
//! declared default, then the scope fallback. Rules run against the chosen
//! value, so a default can satisfy `required`.

use std::collections::BTreeMap;

use assetgate_core::models::{
    ParameterDefinition, ParameterFormat, ParameterRule, ScopeFallback, ScopeValue,
};
use assetgate_core::{AppError, AppResult, ScopeNames, ScopeType};

use crate::registry::DefinitionChain;

/// Resolve the final parameter values for a chain.
pub fn resolve_parameters(
    chain: &DefinitionChain,
    scope: ScopeType,
    scope_value: Option<ScopeValue>,
    supplied: &BTreeMap<String, String>,
    names: &ScopeNames,
) -> AppResult<BTreeMap<String, String>> {
    let scope_value = match (scope, scope_value) {
        (ScopeType::Global, _) => None,
        (_, Some(value)) => Some(value),
        (_, None) => {
            return Err(AppError::MissingParameter {
                parameter: "scopeValue".to_string(),
                details: format!("scope {} requires a scope value", scope),
            })
        }
    };

    let parameters = chain.parameters();

    if let Some(unknown) = supplied
        .keys()
        .find(|key| !parameters.iter().any(|p| &p.name == *key))
    {
        return Err(AppError::InvalidParameter {
            parameter: unknown.clone(),
            reason: format!("unknown parameter for definition {}", chain.name()),
        });
    }

    let mut resolved = BTreeMap::new();
    for parameter in parameters {
        let supplied_value = supplied
            .get(&parameter.name)
            .filter(|value| !value.is_empty())
            .cloned();

        let value = match supplied_value.or_else(|| parameter.default.clone()) {
            Some(value) => Some(value),
            None => fallback_value(parameter, scope, scope_value, names)?,
        };

        let Some(value) = value else {
            if parameter.is_required() {
                return Err(AppError::MissingParameter {
                    parameter: parameter.name.clone(),
                    details: if parameter.description.is_empty() {
                        "required parameter has no value".to_string()
                    } else {
                        parameter.description.clone()
                    },
                });
            }
            continue;
        };

        check_rules(parameter, &value)?;
        check_path_safe(&parameter.name, &value)?;
        resolved.insert(parameter.name.clone(), value);
    }

    Ok(resolved)
}

fn fallback_value(
    parameter: &ParameterDefinition,
    scope: ScopeType,
    scope_value: Option<ScopeValue>,
    names: &ScopeNames,
) -> AppResult<Option<String>> {
    let (Some(fallback), Some(id)) = (parameter.fallback, scope_value) else {
        return Ok(None);
    };
    if !fallback.applies_to(scope) {
        return Ok(None);
    }

    let missing = |table: &str| AppError::MissingParameter {
        parameter: parameter.name.clone(),
        details: format!("no {} registered for scope value {}", table, id),
    };

    match fallback {
        ScopeFallback::ScopeValue => Ok(Some(id.to_string())),
        ScopeFallback::AppName => names
            .app_name(id)
            .map(|name| Some(name.to_string()))
            .ok_or_else(|| missing("app name")),
        ScopeFallback::ClientAppName => names
            .client_app_name(id)
            .map(|name| Some(name.to_string()))
            .ok_or_else(|| missing("client app name")),
    }
}

fn check_rules(parameter: &ParameterDefinition, value: &str) -> AppResult<()> {
    let invalid = |reason: String| AppError::InvalidParameter {
        parameter: parameter.name.clone(),
        reason,
    };

    for rule in &parameter.rules {
        match rule {
            ParameterRule::Required => {}
            ParameterRule::MinLength(min) => {
                if value.chars().count() < *min {
                    return Err(invalid(format!("must be at least {} characters", min)));
                }
            }
            ParameterRule::MaxLength(max) => {
                if value.chars().count() > *max {
                    return Err(invalid(format!("must be at most {} characters", max)));
                }
            }
            ParameterRule::Format(format) => {
                if !matches_format(*format, value) {
                    return Err(invalid(format!("'{}' is not a valid {}", value, format)));
                }
            }
            ParameterRule::OneOf(allowed) => {
                if !allowed.iter().any(|candidate| candidate == value) {
                    return Err(invalid(format!(
                        "'{}' is not one of {}",
                        value,
                        allowed.join(", ")
                    )));
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn matches_format(format: ParameterFormat, value: &str) -> bool {
    match format {
        ParameterFormat::Uuid => value.len() == 36 && uuid::Uuid::parse_str(value).is_ok(),
        ParameterFormat::Slug => {
            !value.is_empty()
                && !value.starts_with('-')
                && !value.ends_with('-')
                && !value.contains("--")
                && value
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        }
        ParameterFormat::Numeric => !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()),
        ParameterFormat::Alphanumeric => {
            !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
        }
        ParameterFormat::Version => value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())),
    }
}

/// Resolved values are spliced into object keys and must stay inside one segment.
fn check_path_safe(name: &str, value: &str) -> AppResult<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains('/') {
        Some("must not contain '/'")
    } else if value.contains("..") {
        Some("must not contain '..'")
    } else if value.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(AppError::InvalidParameter {
            parameter: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefinitionRegistry;
    use assetgate_core::models::{PathDefinition, PathPattern};
    use assetgate_core::ProviderName;

    fn chain() -> DefinitionChain {
        let registry = DefinitionRegistry::new();
        registry
            .register(
                PathDefinition::new("items", "Items")
                    .with_scopes(&[ScopeType::Global, ScopeType::App, ScopeType::ClientApp])
                    .with_parameter(
                        ParameterDefinition::new("environment", "Asset environment")
                            .required()
                            .with_default("dev")
                            .with_rule(ParameterRule::Format(ParameterFormat::Slug)),
                    )
                    .with_parameter(
                        ParameterDefinition::new("app_name", "App name")
                            .with_fallback(ScopeFallback::AppName),
                    )
                    .with_parameter(
                        ParameterDefinition::new("owner", "Owner id")
                            .with_fallback(ScopeFallback::ScopeValue),
                    )
                    .with_pattern(
                        ProviderName::R2,
                        ScopeType::Global,
                        PathPattern::signed("{environment}/"),
                    )
                    .with_child(
                        PathDefinition::new("item", "Item")
                            .with_scopes(&[
                                ScopeType::Global,
                                ScopeType::App,
                                ScopeType::ClientApp,
                            ])
                            .with_parameter(
                                ParameterDefinition::new("item_id", "Item id")
                                    .required()
                                    .with_rule(ParameterRule::Format(ParameterFormat::Uuid)),
                            )
                            .with_parameter(
                                ParameterDefinition::new("format", "File format")
                                    .with_default("png")
                                    .with_rule(ParameterRule::OneOf(vec![
                                        "png".to_string(),
                                        "jpg".to_string(),
                                    ])),
                            ),
                    ),
            )
            .unwrap();
        registry.lookup("item").unwrap()
    }

    fn supplied(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const ID: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn defaults_fill_missing_values() {
        let values = resolve_parameters(
            &chain(),
            ScopeType::Global,
            None,
            &supplied(&[("item_id", ID)]),
            &ScopeNames::default(),
        )
        .unwrap();
        assert_eq!(values["environment"], "dev");
        assert_eq!(values["format"], "png");
        assert!(!values.contains_key("app_name"));
    }

    #[test]
    fn supplied_values_win_over_defaults() {
        let values = resolve_parameters(
            &chain(),
            ScopeType::Global,
            None,
            &supplied(&[("item_id", ID), ("format", "jpg"), ("environment", "prod")]),
            &ScopeNames::default(),
        )
        .unwrap();
        assert_eq!(values["format"], "jpg");
        assert_eq!(values["environment"], "prod");
    }

    #[test]
    fn required_without_value_is_missing() {
        let err = resolve_parameters(
            &chain(),
            ScopeType::Global,
            None,
            &BTreeMap::new(),
            &ScopeNames::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::MissingParameter { ref parameter, .. } if parameter == "item_id"));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let values = resolve_parameters(
            &chain(),
            ScopeType::Global,
            None,
            &supplied(&[("item_id", ID), ("format", "")]),
            &ScopeNames::default(),
        )
        .unwrap();
        assert_eq!(values["format"], "png");
    }

    #[test]
    fn fallbacks_follow_scope() {
        let names = ScopeNames::default().with_app(7, "rowing");
        let values = resolve_parameters(
            &chain(),
            ScopeType::App,
            Some(7),
            &supplied(&[("item_id", ID)]),
            &names,
        )
        .unwrap();
        assert_eq!(values["app_name"], "rowing");
        assert_eq!(values["owner"], "7");

        let values = resolve_parameters(
            &chain(),
            ScopeType::ClientApp,
            Some(9),
            &supplied(&[("item_id", ID)]),
            &names,
        )
        .unwrap();
        assert!(!values.contains_key("app_name"));
        assert_eq!(values["owner"], "9");
    }

    #[test]
    fn missing_table_entry_is_reported() {
        let err = resolve_parameters(
            &chain(),
            ScopeType::App,
            Some(42),
            &supplied(&[("item_id", ID)]),
            &ScopeNames::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::MissingParameter { ref parameter, .. } if parameter == "app_name"));
    }

    #[test]
    fn non_global_scope_requires_scope_value() {
        let err = resolve_parameters(
            &chain(),
            ScopeType::ClientApp,
            None,
            &supplied(&[("item_id", ID)]),
            &ScopeNames::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::MissingParameter { ref parameter, .. } if parameter == "scopeValue"));
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let err = resolve_parameters(
            &chain(),
            ScopeType::Global,
            None,
            &supplied(&[("item_id", ID), ("colour", "red")]),
            &ScopeNames::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter { ref parameter, .. } if parameter == "colour"));
    }

    #[test]
    fn rules_check_the_final_value() {
        for (key, value) in [
            ("item_id", "not-a-uuid"),
            ("format", "gif"),
            ("environment", "Prod"),
        ] {
            let mut values = supplied(&[("item_id", ID)]);
            values.insert(key.to_string(), value.to_string());
            let err = resolve_parameters(
                &chain(),
                ScopeType::Global,
                None,
                &values,
                &ScopeNames::default(),
            )
            .unwrap_err();
            assert!(
                matches!(err, AppError::InvalidParameter { ref parameter, .. } if parameter == key),
                "{} = {} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn values_cannot_escape_their_segment() {
        for value in ["a/b", "..", "a\nb"] {
            assert!(check_path_safe("p", value).is_err(), "{:?}", value);
        }
        assert!(check_path_safe("p", "v1.2").is_ok());
    }

    #[test]
    fn formats() {
        assert!(matches_format(ParameterFormat::Slug, "client-app-1"));
        assert!(!matches_format(ParameterFormat::Slug, "a--b"));
        assert!(matches_format(ParameterFormat::Version, "1.4.2"));
        assert!(!matches_format(ParameterFormat::Version, "1..2"));
        assert!(matches_format(ParameterFormat::Numeric, "0042"));
        assert!(!matches_format(ParameterFormat::Alphanumeric, "a_b"));
        assert!(!matches_format(ParameterFormat::Uuid, "11111111111111111111111111111111"));
    }
}
