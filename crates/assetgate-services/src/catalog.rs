//! Built-in path definitions.

use assetgate_core::models::{
    ParameterDefinition, ParameterFormat, ParameterRule, PathDefinition, PathPattern,
    ScopeFallback, StorageMetadataDefaults,
};
use assetgate_core::{AppResult, ProviderName, ScopeType};

use crate::registry::DefinitionRegistry;

const BUCKET_ROOT: &str = "aviron-game-assets";

/// Register every built-in definition tree.
pub fn register_builtin(registry: &DefinitionRegistry, asset_environment: &str) -> AppResult<()> {
    for definition in builtin_definitions(asset_environment) {
        registry.register(definition)?;
    }
    tracing::info!(
        definitions = registry.len(),
        asset_environment = %asset_environment,
        "Built-in path definitions registered"
    );
    Ok(())
}

pub fn builtin_definitions(asset_environment: &str) -> Vec<PathDefinition> {
    vec![achievements(asset_environment), game_builds(asset_environment)]
}

fn environment(asset_environment: &str) -> ParameterDefinition {
    ParameterDefinition::new("environment", "Asset environment the object belongs to")
        .required()
        .with_default(asset_environment)
        .with_rule(ParameterRule::Format(ParameterFormat::Slug))
}

fn app_name() -> ParameterDefinition {
    ParameterDefinition::new("app_name", "App name, looked up from the scope value in App scope")
        .with_rule(ParameterRule::MaxLength(64))
        .with_fallback(ScopeFallback::AppName)
}

fn client_app_name() -> ParameterDefinition {
    ParameterDefinition::new(
        "client_app_name",
        "Client app name, looked up from the scope value in ClientApp scope",
    )
    .with_rule(ParameterRule::MaxLength(64))
    .with_fallback(ScopeFallback::ClientAppName)
}

fn one_of(values: &[&str]) -> ParameterRule {
    ParameterRule::OneOf(values.iter().map(|v| v.to_string()).collect())
}

/// Object-store patterns for the three scope tiers under `section`.
fn tiered(mut definition: PathDefinition, section: &str, scopes: &[ScopeType]) -> PathDefinition {
    for provider in [ProviderName::R2, ProviderName::Gcs] {
        for scope in scopes {
            let pattern = match scope {
                ScopeType::Global => {
                    format!("{}/{{environment}}/shared/global/{}/", BUCKET_ROOT, section)
                }
                ScopeType::App => format!("{}/{{environment}}/apps/{{app_name}}/{}/", BUCKET_ROOT, section),
                ScopeType::ClientApp => format!(
                    "{}/{{environment}}/client-apps/{{client_app_name}}/{}/",
                    BUCKET_ROOT, section
                ),
            };
            definition = definition.with_pattern(provider, *scope, PathPattern::signed(pattern));
        }
    }
    definition
}

fn achievements(asset_environment: &str) -> PathDefinition {
    let scopes = [ScopeType::Global, ScopeType::App, ScopeType::ClientApp];

    let achievement = PathDefinition::new("achievement", "Achievement icon")
        .with_description("Icon image of a single achievement")
        .with_scopes(&scopes)
        .with_parameter(
            ParameterDefinition::new("achievement_id", "Achievement id")
                .required()
                .with_rule(ParameterRule::Format(ParameterFormat::Uuid)),
        )
        .with_parameter(
            ParameterDefinition::new("format", "Image format")
                .with_default("png")
                .with_rule(one_of(&["png", "jpg", "jpeg", "webp", "svg"])),
        )
        .with_storage_metadata(StorageMetadataDefaults {
            cache_control: Some("public, max-age=31536000, immutable".to_string()),
            ..Default::default()
        });
    let achievement = tiered_leaf(achievement, &scopes, "{achievement_id}.{format}")
        .with_pattern(
            ProviderName::Cdn,
            ScopeType::Global,
            PathPattern::public("{achievement_id}.{format}"),
        )
        .with_pattern(
            ProviderName::Cdn,
            ScopeType::App,
            PathPattern::public("{achievement_id}.{format}"),
        );

    tiered(
        PathDefinition::new("achievements", "Achievements")
            .with_description("Achievement assets, shared or per app")
            .with_scopes(&scopes)
            .with_parameter(environment(asset_environment))
            .with_parameter(app_name())
            .with_parameter(client_app_name()),
        "achievements",
        &scopes,
    )
    .with_pattern(
        ProviderName::Cdn,
        ScopeType::Global,
        PathPattern::public("{environment}/achievements/global/"),
    )
    .with_pattern(
        ProviderName::Cdn,
        ScopeType::App,
        PathPattern::public("{environment}/achievements/apps/{app_name}/"),
    )
    .with_child(achievement)
}

fn game_builds(asset_environment: &str) -> PathDefinition {
    let scopes = [ScopeType::App, ScopeType::ClientApp];

    let build = PathDefinition::new("game_build", "Game build")
        .with_description("Packaged build of a game for one platform")
        .with_scopes(&scopes)
        .with_parameter(
            ParameterDefinition::new("version", "Dotted build version")
                .required()
                .with_rule(ParameterRule::MaxLength(32))
                .with_rule(ParameterRule::Format(ParameterFormat::Version)),
        )
        .with_parameter(
            ParameterDefinition::new("platform", "Target platform")
                .required()
                .with_rule(one_of(&["windows", "macos", "linux", "android", "ios"])),
        )
        .with_parameter(
            ParameterDefinition::new("extension", "Archive extension")
                .with_default("zip")
                .with_rule(one_of(&["zip", "apk", "ipa"])),
        )
        .with_storage_metadata(StorageMetadataDefaults {
            cache_control: Some("private, no-cache".to_string()),
            ..Default::default()
        });

    tiered(
        PathDefinition::new("game_builds", "Game builds")
            .with_description("Game build archives per app")
            .with_scopes(&scopes)
            .with_parameter(environment(asset_environment))
            .with_parameter(app_name())
            .with_parameter(client_app_name()),
        "builds",
        &scopes,
    )
    .with_child(tiered_leaf(build, &scopes, "{version}/{platform}.{extension}"))
}

fn tiered_leaf(mut definition: PathDefinition, scopes: &[ScopeType], pattern: &str) -> PathDefinition {
    for provider in [ProviderName::R2, ProviderName::Gcs] {
        for scope in scopes {
            definition = definition.with_pattern(provider, *scope, PathPattern::signed(pattern));
        }
    }
    definition
}
