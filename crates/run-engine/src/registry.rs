//! Entity registry
//!
//! Built once at startup and shared read-only afterwards.

use std::collections::HashMap;

use playground_core::EntityKind;

use crate::agent::Agent;
use crate::entity::Entity;
use crate::error::{Result, RunError};
use crate::team::Team;
use crate::workflow::Workflow;

#[derive(Debug)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<&Entity> {
        self.index.get(entity_id).map(|&i| &self.entities[i])
    }

    /// Entities in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<Entity>,
}

impl RegistryBuilder {
    pub fn agent(self, agent: Agent) -> Self {
        self.entity(agent.into())
    }

    pub fn team(self, team: Team) -> Self {
        self.entity(team.into())
    }

    pub fn workflow(self, workflow: Workflow) -> Self {
        self.entity(workflow.into())
    }

    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Freeze the registry. Ids must be unique and at least one entity is
    /// required.
    pub fn build(self) -> Result<EntityRegistry> {
        if self.entities.is_empty() {
            return Err(RunError::configuration(
                "Either agents, teams or workflows must be provided",
            ));
        }

        let mut index = HashMap::new();
        for (i, entity) in self.entities.iter().enumerate() {
            if index.insert(entity.id().to_string(), i).is_some() {
                return Err(RunError::configuration(format!(
                    "Duplicate entity id: {}",
                    entity.id()
                )));
            }
        }

        Ok(EntityRegistry {
            entities: self.entities,
            index,
        })
    }
}
