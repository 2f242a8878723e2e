use serde::{Deserialize, Serialize};

use super::MachineType;

/// Process qualification of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorType {
    Milling,
    Turning,
    Both,
}

impl OperatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Milling => "MILLING",
            Self::Turning => "TURNING",
            Self::Both => "BOTH",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MILLING" => Some(Self::Milling),
            "TURNING" => Some(Self::Turning),
            "BOTH" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether an operator with this qualification may run the given machine.
    pub fn can_run(&self, machine_type: MachineType) -> bool {
        match self {
            Self::Both => true,
            Self::Milling => machine_type == MachineType::Milling,
            Self::Turning => machine_type == MachineType::Turning,
        }
    }
}

/// Operator — referenced, not owned, by shifts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub operator_type: OperatorType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<String>,
}
