use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::{ObjectUrl, ProviderName, ScopeType};

/// Output of resolution: a concrete path plus a usable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedResource {
    /// Definition the path was rendered from; absent for raw-path resolution
    pub definition: Option<String>,
    pub provider: ProviderName,
    pub scope: Option<ScopeType>,
    pub path: String,
    pub parameters: BTreeMap<String, String>,
    pub url: ObjectUrl,
    /// Unsigned read URL, when the pattern is public and the provider serves one
    pub public_url: Option<String>,
}
