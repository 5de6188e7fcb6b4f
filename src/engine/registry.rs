use dashmap::mapref::entry::Entry;
use tracing::info;
use ulid::Ulid;

use super::{Engine, EngineError};
use crate::limits::*;
use crate::model::*;

impl Engine {
    pub(super) fn require_privileged(&self, actor: &Principal, what: &'static str) -> Result<(), EngineError> {
        if self.policy.is_privileged(actor) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(what))
        }
    }

    /// Register one cubicle. Position and code must both be unused.
    pub async fn create_resource(
        &self,
        position: GridPosition,
        code: impl Into<String>,
        actor: &Principal,
    ) -> Result<Resource, EngineError> {
        self.require_privileged(actor, "only privileged users may create resources")?;
        let code = code.into();
        validate_position(position)?;
        validate_code(&code)?;
        if self.resources.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }

        let now = self.now();
        let resource = Resource {
            id: Ulid::new(),
            code,
            position,
            operational_status: OperationalStatus::Available,
            created_by: actor.email.clone(),
            modified_by: None,
            created_at: now,
            updated_at: now,
            revision: 1,
        };

        let _gate = self.commit_gate.read().await;
        self.claim_position(&resource)?;
        self.resources.insert(resource.id, resource.clone());
        if let Err(e) = self
            .commit(Event::ResourceCreated { resource: resource.clone() })
            .await
        {
            self.resources.remove(&resource.id);
            self.positions.remove_if(&resource.position, |_, id| *id == resource.id);
            self.codes.remove_if(&resource.code, |_, id| *id == resource.id);
            return Err(e);
        }
        Ok(resource)
    }

    fn claim_position(&self, resource: &Resource) -> Result<(), EngineError> {
        match self.positions.entry(resource.position) {
            Entry::Occupied(_) => {
                let GridPosition { section, row, column } = resource.position;
                return Err(EngineError::AlreadyExists(format!(
                    "position {section} row {row} column {column}"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(resource.id);
            }
        }
        match self.codes.entry(resource.code.clone()) {
            Entry::Occupied(_) => {
                self.positions.remove_if(&resource.position, |_, id| *id == resource.id);
                Err(EngineError::AlreadyExists(format!("code {}", resource.code)))
            }
            Entry::Vacant(slot) => {
                slot.insert(resource.id);
                Ok(())
            }
        }
    }

    /// Create every position of `layout` that is not registered yet. Returns
    /// how many were created.
    pub async fn seed_layout(&self, layout: &GridLayout, actor: &Principal) -> Result<usize, EngineError> {
        self.require_privileged(actor, "only privileged users may seed the layout")?;
        let mut created = 0;
        for section in &layout.sections {
            for position in section.positions() {
                if self.positions.contains_key(&position) {
                    continue;
                }
                let code = section.code_for(position.row, position.column);
                match self.create_resource(position, code, actor).await {
                    Ok(_) => created += 1,
                    Err(EngineError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        if created > 0 {
            info!(created, total = self.resources.len(), "seeded layout");
        }
        Ok(created)
    }

    /// All resources in floor order: section, row, column.
    pub fn list_resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        resources.sort_by_key(|r| r.position);
        resources
    }

    pub fn get_resource(&self, id: &Ulid) -> Result<Resource, EngineError> {
        self.resources
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::ResourceNotFound(*id))
    }

    pub fn resource_by_code(&self, code: &str) -> Option<Resource> {
        let id = *self.codes.get(code)?.value();
        self.resources.get(&id).map(|e| e.value().clone())
    }

    /// Set the maintenance flag. Entering or leaving `Error` is privileged;
    /// setting the current status again is a no-op.
    pub async fn set_operational_status(
        &self,
        id: Ulid,
        status: OperationalStatus,
        actor: &Principal,
    ) -> Result<Resource, EngineError> {
        let current = self.get_resource(&id)?;
        let touches_error =
            status == OperationalStatus::Error || current.operational_status == OperationalStatus::Error;
        if touches_error {
            self.require_privileged(actor, "only privileged users may set or clear the error status")?;
        }
        if current.operational_status == status {
            return Ok(current);
        }

        let mut next = current.clone();
        next.operational_status = status;
        next.modified_by = Some(actor.email.clone());
        next.updated_at = self.now();
        next.revision = current.revision + 1;

        let _gate = self.commit_gate.read().await;
        {
            let mut entry = self.resources.get_mut(&id).ok_or(EngineError::ResourceNotFound(id))?;
            if entry.revision != current.revision {
                return Err(EngineError::StaleRevision {
                    id,
                    expected: current.revision,
                    found: entry.revision,
                });
            }
            *entry = next.clone();
        }
        if let Err(e) = self
            .commit(Event::ResourceUpdated { resource: next.clone() })
            .await
        {
            if let Some(mut entry) = self.resources.get_mut(&id)
                && entry.revision == next.revision
            {
                *entry = current;
            }
            return Err(e);
        }
        info!(
            resource = %next.code,
            from = current.operational_status.as_str(),
            to = status.as_str(),
            by = %actor.email,
            "operational status changed"
        );
        Ok(next)
    }
}

fn validate_position(position: GridPosition) -> Result<(), EngineError> {
    if !position.section.is_ascii_uppercase() {
        return Err(EngineError::validation("section", "must be a letter A-Z"));
    }
    if position.row == 0 || position.row > MAX_GRID_ROWS {
        return Err(EngineError::validation("row", format!("must be within 1..={MAX_GRID_ROWS}")));
    }
    if position.column == 0 || position.column > MAX_GRID_COLUMNS {
        return Err(EngineError::validation(
            "column",
            format!("must be within 1..={MAX_GRID_COLUMNS}"),
        ));
    }
    Ok(())
}

fn validate_code(code: &str) -> Result<(), EngineError> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EngineError::validation("code", "must be non-empty and alphanumeric"));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(EngineError::LimitExceeded("code too long"));
    }
    Ok(())
}
