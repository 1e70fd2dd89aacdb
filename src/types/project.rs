//! Project and Resource Entities
//!
//! A Project namespaces resources, runs, and hypotheses. A Resource is a
//! text document of one of two kinds used as pipeline input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A namespace grouping resources, runs, and hypotheses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Soft-delete marker; hard delete cascades to children
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of input document a Resource holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// The target specification the hypotheses must serve
    TargetSpec,
    /// The technical assets document describing available capabilities
    TechnicalAssets,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetSpec => "target_spec",
            Self::TechnicalAssets => "technical_assets",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "target_spec" => Some(Self::TargetSpec),
            "technical_assets" => Some(Self::TechnicalAssets),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A text document owned by exactly one Project, referenced by id from runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub project_id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(
        project_id: impl Into<String>,
        kind: ResourceKind,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            kind,
            name: name.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_round_trip() {
        for kind in [ResourceKind::TargetSpec, ResourceKind::TechnicalAssets] {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("unknown"), None);
    }
}
