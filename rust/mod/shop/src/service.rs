use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use planwerk_core::{apply_patch, new_id, now_rfc3339, ServiceError};

use crate::model::{Machine, MachineState, MachineType, Operator, OperatorType};
use crate::store::{MachineFilters, ShopStore};

/// Attempts before giving up on a version-CAS race.
const CAS_ATTEMPTS: usize = 3;

/// Body for `POST /machines`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMachineRequest {
    pub code: String,

    #[serde(rename = "type")]
    pub machine_type: MachineType,

    pub axes: u32,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Body for `POST /operators`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperatorRequest {
    pub name: String,

    #[serde(rename = "type")]
    pub operator_type: OperatorType,
}

/// Shop service — machine registry and operator roster business logic.
pub struct ShopService {
    store: Arc<ShopStore>,
}

impl ShopService {
    pub fn new(store: Arc<ShopStore>) -> Self {
        Self { store }
    }

    /// The underlying store (shared with the scheduler).
    pub fn store(&self) -> &Arc<ShopStore> {
        &self.store
    }

    // ── Machines ──

    pub fn register_machine(&self, req: RegisterMachineRequest) -> Result<Machine, ServiceError> {
        if req.code.trim().is_empty() {
            return Err(ServiceError::Validation("machine code must not be empty".into()));
        }
        if req.axes == 0 {
            return Err(ServiceError::Validation(format!(
                "machine '{}' must have at least one axis",
                req.code
            )));
        }

        let machine = Machine {
            code: req.code.trim().to_string(),
            machine_type: req.machine_type,
            axes: req.axes,
            is_active: true,
            state: MachineState::Free,
            is_occupied: false,
            version: 0,
            display_name: req.display_name,
            description: req.description,
            create_at: Some(now_rfc3339()),
            update_at: None,
        };

        self.store.insert_machine(&machine)?;
        Ok(machine)
    }

    pub fn get_machine(&self, code: &str) -> Result<Machine, ServiceError> {
        self.store.get_machine(code)
    }

    pub fn list_machines(&self, filters: &MachineFilters) -> Result<Vec<Machine>, ServiceError> {
        self.store.list_machines(filters)
    }

    pub fn list_available(
        &self,
        required_axes: u32,
        required_type: MachineType,
    ) -> Result<Vec<Machine>, ServiceError> {
        self.store.list_available(required_axes, required_type)
    }

    /// Merge-patch descriptive fields of a machine.
    ///
    /// The scheduler owns `state`/`isOccupied`/`version`; those and the
    /// identity fields are stripped from the patch.
    pub fn update_machine(
        &self,
        code: &str,
        patch: serde_json::Value,
    ) -> Result<Machine, ServiceError> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.store.get_machine(code)?;
            let patched: Machine = apply_patch(
                &current,
                patch.clone(),
                &["code", "state", "isOccupied", "version", "createAt"],
            )?;
            if patched.axes == 0 {
                return Err(ServiceError::Validation(format!(
                    "machine '{code}' must have at least one axis"
                )));
            }
            if let Some(updated) = self.store.cas_update(&patched)? {
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "machine '{code}' was updated concurrently, retry"
        )))
    }

    /// Soft activate/deactivate. Machines stay in the registry forever once
    /// a shift has referenced them; deactivation is the only removal path.
    pub fn set_active(&self, code: &str, active: bool) -> Result<Machine, ServiceError> {
        for _ in 0..CAS_ATTEMPTS {
            let mut machine = self.store.get_machine(code)?;
            if machine.is_active == active {
                return Ok(machine);
            }
            if !active && machine.state != MachineState::Free {
                return Err(ServiceError::Validation(format!(
                    "machine '{code}' is {}; release its shift before deactivating",
                    machine.state
                )));
            }
            machine.is_active = active;
            if let Some(updated) = self.store.cas_update(&machine)? {
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "machine '{code}' was updated concurrently, retry"
        )))
    }

    /// Administrative occupancy override.
    ///
    /// Normal occupancy flips happen through the scheduler; this endpoint
    /// exists for corrections. RESERVED machines belong to an in-flight
    /// reservation and are not overridable.
    pub fn set_occupied(&self, code: &str, occupied: bool) -> Result<Machine, ServiceError> {
        for _ in 0..CAS_ATTEMPTS {
            let mut machine = self.store.get_machine(code)?;
            match (machine.state, occupied) {
                (MachineState::Occupied, true) | (MachineState::Free, false) => {
                    return Ok(machine);
                }
                (MachineState::Reserved, _) => {
                    return Err(ServiceError::Conflict(format!(
                        "machine '{code}' has a pending reservation"
                    )));
                }
                (MachineState::Free, true) => {
                    if !machine.is_active {
                        return Err(ServiceError::Validation(format!(
                            "machine '{code}' is inactive"
                        )));
                    }
                    machine.state = MachineState::Occupied;
                }
                (MachineState::Occupied, false) => {
                    machine.state = MachineState::Free;
                }
            }
            if let Some(updated) = self.store.cas_update(&machine)? {
                warn!("machine {code} occupancy set to {occupied} by admin override");
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "machine '{code}' was updated concurrently, retry"
        )))
    }

    // ── Operators ──

    pub fn create_operator(&self, req: CreateOperatorRequest) -> Result<Operator, ServiceError> {
        if req.name.trim().is_empty() {
            return Err(ServiceError::Validation("operator name must not be empty".into()));
        }

        let operator = Operator {
            id: new_id(),
            name: req.name.trim().to_string(),
            operator_type: req.operator_type,
            create_at: Some(now_rfc3339()),
            update_at: None,
        };

        self.store.insert_operator(&operator)?;
        Ok(operator)
    }

    pub fn get_operator(&self, id: &str) -> Result<Operator, ServiceError> {
        self.store.get_operator(id)
    }

    pub fn list_operators(&self) -> Result<Vec<Operator>, ServiceError> {
        self.store.list_operators()
    }

    pub fn update_operator(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Operator, ServiceError> {
        let current = self.store.get_operator(id)?;
        let patched: Operator = apply_patch(&current, patch, &["id", "createAt"])?;
        if patched.name.trim().is_empty() {
            return Err(ServiceError::Validation("operator name must not be empty".into()));
        }
        self.store.update_operator(&patched)?;
        Ok(patched)
    }
}
