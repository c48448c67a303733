use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The three kinds of executable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent,
    Team,
    Workflow,
}

impl EntityKind {
    /// Parse either the singular name or the plural route segment.
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "agent" | "agents" => Ok(Self::Agent),
            "team" | "teams" => Ok(Self::Team),
            "workflow" | "workflows" => Ok(Self::Workflow),
            _ => Err(Error::InvalidInput(format!("Invalid entity kind: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Team => "team",
            Self::Workflow => "workflow",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Team => "teams",
            Self::Workflow => "workflows",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_segments() {
        assert_eq!(EntityKind::from_str("agents").unwrap(), EntityKind::Agent);
        assert_eq!(EntityKind::from_str("Team").unwrap(), EntityKind::Team);
        assert_eq!(
            EntityKind::from_str("workflows").unwrap(),
            EntityKind::Workflow
        );
        assert!(EntityKind::from_str("pipelines").is_err());
    }

    #[test]
    fn test_plural_round_trips() {
        for kind in [EntityKind::Agent, EntityKind::Team, EntityKind::Workflow] {
            assert_eq!(EntityKind::from_str(kind.plural()).unwrap(), kind);
        }
    }
}
