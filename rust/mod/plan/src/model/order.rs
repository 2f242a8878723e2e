use serde::{Deserialize, Serialize};

use shop::model::MachineType;

/// Production stage of an order.
///
/// ```text
/// INTAKE → IN_PRODUCTION → DONE → ARCHIVED
/// ```
///
/// Orders are archived on completion, never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Intake,
    InProduction,
    Done,
    Archived,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::InProduction => "IN_PRODUCTION",
            Self::Done => "DONE",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INTAKE" => Some(Self::Intake),
            "IN_PRODUCTION" => Some(Self::InProduction),
            "DONE" => Some(Self::Done),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manufacturing order.
///
/// The drawing number is the external identity and is unique at the
/// persistence boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,

    /// Unique external identifier (e.g. "DRW-2024-0117").
    pub drawing_number: String,

    /// Part or job name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Machining process this order needs.
    pub process_type: MachineType,

    /// Free-text machine requirement, e.g. "3-axis milling".
    #[serde(default)]
    pub spec: String,

    pub status: OrderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<String>,
}

/// Body for `POST /orders`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub drawing_number: String,

    #[serde(default)]
    pub name: Option<String>,

    pub process_type: MachineType,

    /// Free-text machine requirement.
    #[serde(default)]
    pub spec: String,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}
