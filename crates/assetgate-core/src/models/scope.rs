use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Integer selector for non-global scopes (an app id or a client-app id).
pub type ScopeValue = i64;

/// Audience tier a resource belongs to.
///
/// Serialized with the short codes used on the wire: `G`, `A`, `CA`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum ScopeType {
    #[default]
    #[serde(rename = "G", alias = "global", alias = "Global")]
    Global,
    #[serde(rename = "A", alias = "app", alias = "App")]
    App,
    #[serde(rename = "CA", alias = "client_app", alias = "ClientApp")]
    ClientApp,
}

impl ScopeType {
    pub const ALL: [ScopeType; 3] = [ScopeType::Global, ScopeType::App, ScopeType::ClientApp];

    pub fn code(&self) -> &'static str {
        match self {
            ScopeType::Global => "G",
            ScopeType::App => "A",
            ScopeType::ClientApp => "CA",
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ScopeType::Global)
    }
}

impl FromStr for ScopeType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "g" | "global" => Ok(ScopeType::Global),
            "a" | "app" => Ok(ScopeType::App),
            "ca" | "client_app" | "clientapp" => Ok(ScopeType::ClientApp),
            _ => Err(AppError::InvalidParameter {
                parameter: "scope".to_string(),
                reason: format!("unknown scope '{}', expected G, A or CA", s),
            }),
        }
    }
}

impl Display for ScopeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.code())
    }
}
