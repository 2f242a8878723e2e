use serde::{Deserialize, Serialize};

/// Lifecycle state of a shift.
///
/// ```text
/// RESERVED → OCCUPIED → RELEASED
///         → CANCELLED (caller abandons before confirm)
///         → EXPIRED   (reservation TTL ran out)
/// ```
///
/// Terminal rows are history — they are retained indefinitely and never
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftStatus {
    Reserved,
    Occupied,
    Released,
    Cancelled,
    Expired,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Occupied => "OCCUPIED",
            Self::Released => "RELEASED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RESERVED" => Some(Self::Reserved),
            "OCCUPIED" => Some(Self::Occupied),
            "RELEASED" => Some(Self::Released),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether the shift has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Cancelled | Self::Expired)
    }

    /// Whether a shift in this state blocks its (machine, date) slot.
    ///
    /// RELEASED still blocks: the machine worked that date; the slot is
    /// history, not free capacity. CANCELLED and EXPIRED never ran.
    pub fn blocks_date(&self) -> bool {
        matches!(self, Self::Reserved | Self::Occupied | Self::Released)
    }
}

impl std::fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled assignment of one order to one machine and operator on a
/// given date.
///
/// References are non-owning: deleting is not offered, and a shift never
/// owns its order, machine, or operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: String,

    pub order_id: String,

    /// Denormalized from the order for calendar views.
    pub drawing_number: String,

    pub machine_code: String,

    pub operator_id: String,

    /// ISO calendar date, `YYYY-MM-DD`.
    pub date: String,

    pub status: ShiftStatus,

    /// RESERVED only: when the unconfirmed reservation lapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,

    pub create_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<String>,
}

/// Body for `POST /shifts` — reserve a machine for an order on a date.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShiftRequest {
    pub order_id: String,
    pub machine_code: String,
    pub operator_id: String,
    /// ISO calendar date, `YYYY-MM-DD`.
    pub date: String,
}

/// Query parameters for `GET /shifts` — the calendar read path.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,

    #[serde(default)]
    pub machine_code: Option<String>,

    #[serde(default)]
    pub operator_id: Option<String>,

    #[serde(default)]
    pub order_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}
