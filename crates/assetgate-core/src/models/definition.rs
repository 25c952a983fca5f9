use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ChecksumAlgorithm, ProviderName, ScopeType};

/// Whether a rendered path is read through a signed or a public URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UrlType {
    #[default]
    Signed,
    Public,
}

/// A path pattern for one provider and scope, e.g. `"{achievement_id}.{format}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    pub pattern: String,
    pub url_type: UrlType,
}

impl PathPattern {
    pub fn signed(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            url_type: UrlType::Signed,
        }
    }

    pub fn public(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            url_type: UrlType::Public,
        }
    }
}

/// Value formats a parameter can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterFormat {
    Uuid,
    /// Lowercase letters, digits and single dashes
    Slug,
    Numeric,
    Alphanumeric,
    /// Dotted numeric version such as `1.4.2`
    Version,
}

impl Display for ParameterFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            ParameterFormat::Uuid => "uuid",
            ParameterFormat::Slug => "slug",
            ParameterFormat::Numeric => "numeric",
            ParameterFormat::Alphanumeric => "alphanumeric",
            ParameterFormat::Version => "version",
        };
        write!(f, "{}", name)
    }
}

/// Validation rule applied to a parameter's final value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterRule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Format(ParameterFormat),
    OneOf(Vec<String>),
}

impl Display for ParameterRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ParameterRule::Required => write!(f, "required"),
            ParameterRule::MinLength(n) => write!(f, "min_length:{}", n),
            ParameterRule::MaxLength(n) => write!(f, "max_length:{}", n),
            ParameterRule::Format(format) => write!(f, "format:{}", format),
            ParameterRule::OneOf(values) => write!(f, "one_of:{}", values.join("|")),
        }
    }
}

/// Where a parameter's value comes from when neither supplied nor defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFallback {
    /// The raw scope value (app id or client-app id)
    ScopeValue,
    /// The app name looked up by scope value, App scope only
    AppName,
    /// The client-app name looked up by scope value, ClientApp scope only
    ClientAppName,
}

impl ScopeFallback {
    pub fn applies_to(&self, scope: ScopeType) -> bool {
        match self {
            ScopeFallback::ScopeValue => !scope.is_global(),
            ScopeFallback::AppName => scope == ScopeType::App,
            ScopeFallback::ClientAppName => scope == ScopeType::ClientApp,
        }
    }
}

impl Display for ScopeFallback {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            ScopeFallback::ScopeValue => "scope_value",
            ScopeFallback::AppName => "app_name",
            ScopeFallback::ClientAppName => "client_app_name",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub name: String,
    pub default: Option<String>,
    pub rules: Vec<ParameterRule>,
    pub fallback: Option<ScopeFallback>,
    pub description: String,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            rules: Vec::new(),
            fallback: None,
            description: description.into(),
        }
    }

    pub fn required(mut self) -> Self {
        self.rules.push(ParameterRule::Required);
        self
    }

    pub fn with_rule(mut self, rule: ParameterRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_fallback(mut self, fallback: ScopeFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.contains(&ParameterRule::Required)
    }
}

/// Storage metadata applied to every upload of a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageMetadataDefaults {
    pub cache_control: Option<String>,
    pub required_checksums: Vec<ChecksumAlgorithm>,
    pub custom_headers: BTreeMap<String, String>,
}

/// A named, parameterized template describing where a class of resources lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub allowed_scopes: Vec<ScopeType>,
    pub parameters: Vec<ParameterDefinition>,
    pub patterns: BTreeMap<ProviderName, BTreeMap<ScopeType, PathPattern>>,
    pub default_storage_metadata: Option<StorageMetadataDefaults>,
    pub child: Option<Box<PathDefinition>>,
}

impl PathDefinition {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: String::new(),
            allowed_scopes: Vec::new(),
            parameters: Vec::new(),
            patterns: BTreeMap::new(),
            default_storage_metadata: None,
            child: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scopes(mut self, scopes: &[ScopeType]) -> Self {
        self.allowed_scopes = scopes.to_vec();
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_pattern(
        mut self,
        provider: ProviderName,
        scope: ScopeType,
        pattern: PathPattern,
    ) -> Self {
        self.patterns
            .entry(provider)
            .or_default()
            .insert(scope, pattern);
        self
    }

    pub fn with_storage_metadata(mut self, metadata: StorageMetadataDefaults) -> Self {
        self.default_storage_metadata = Some(metadata);
        self
    }

    pub fn with_child(mut self, child: PathDefinition) -> Self {
        self.child = Some(Box::new(child));
        self
    }

    pub fn allows_scope(&self, scope: ScopeType) -> bool {
        self.allowed_scopes.contains(&scope)
    }

    pub fn pattern(&self, provider: ProviderName, scope: ScopeType) -> Option<&PathPattern> {
        self.patterns.get(&provider).and_then(|p| p.get(&scope))
    }

    pub fn providers(&self) -> Vec<ProviderName> {
        self.patterns.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_have_stable_display_strings() {
        assert_eq!(ParameterRule::Required.to_string(), "required");
        assert_eq!(ParameterRule::MinLength(3).to_string(), "min_length:3");
        assert_eq!(
            ParameterRule::Format(ParameterFormat::Uuid).to_string(),
            "format:uuid"
        );
        assert_eq!(
            ParameterRule::OneOf(vec!["png".to_string(), "jpg".to_string()]).to_string(),
            "one_of:png|jpg"
        );
    }

    #[test]
    fn fallbacks_apply_to_matching_scopes_only() {
        assert!(!ScopeFallback::ScopeValue.applies_to(ScopeType::Global));
        assert!(ScopeFallback::ScopeValue.applies_to(ScopeType::ClientApp));
        assert!(ScopeFallback::AppName.applies_to(ScopeType::App));
        assert!(!ScopeFallback::AppName.applies_to(ScopeType::ClientApp));
        assert!(ScopeFallback::ClientAppName.applies_to(ScopeType::ClientApp));
    }

    #[test]
    fn patterns_are_keyed_by_provider_and_scope() {
        let definition = PathDefinition::new("icons", "Icons")
            .with_scopes(&[ScopeType::Global])
            .with_pattern(ProviderName::R2, ScopeType::Global, PathPattern::signed("icons/"))
            .with_pattern(ProviderName::Cdn, ScopeType::Global, PathPattern::public("i/"));

        assert_eq!(
            definition.providers(),
            vec![ProviderName::Cdn, ProviderName::R2]
        );
        assert_eq!(
            definition
                .pattern(ProviderName::Cdn, ScopeType::Global)
                .map(|p| p.url_type),
            Some(UrlType::Public)
        );
        assert!(definition.pattern(ProviderName::Gcs, ScopeType::Global).is_none());
    }
}
