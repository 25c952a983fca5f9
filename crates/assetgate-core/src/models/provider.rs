use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Storage provider families the broker can address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Cdn,
    Gcs,
    R2,
}

impl ProviderName {
    pub const ALL: [ProviderName; 3] = [ProviderName::Cdn, ProviderName::Gcs, ProviderName::R2];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Cdn => "cdn",
            ProviderName::Gcs => "gcs",
            ProviderName::R2 => "r2",
        }
    }
}

impl FromStr for ProviderName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cdn" => Ok(ProviderName::Cdn),
            "gcs" => Ok(ProviderName::Gcs),
            "r2" => Ok(ProviderName::R2),
            _ => Err(AppError::InvalidProvider(s.to_string())),
        }
    }
}

impl Display for ProviderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP method a signed URL is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
