use serde::{Deserialize, Serialize};

/// Machining process a machine performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineType {
    Milling,
    Turning,
}

impl MachineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Milling => "MILLING",
            Self::Turning => "TURNING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MILLING" => Some(Self::Milling),
            "TURNING" => Some(Self::Turning),
            _ => None,
        }
    }
}

impl std::fmt::Display for MachineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assignment state of a machine.
///
/// ```text
/// FREE → RESERVED → OCCUPIED → FREE
///               ↘ FREE (cancel / expiry)
/// ```
///
/// Every transition is a compare-and-swap on the machine row, so two
/// request handlers racing for the same machine cannot both win.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    #[default]
    Free,
    Reserved,
    Occupied,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Reserved => "RESERVED",
            Self::Occupied => "OCCUPIED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FREE" => Some(Self::Free),
            "RESERVED" => Some(Self::Reserved),
            "OCCUPIED" => Some(Self::Occupied),
            _ => None,
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine — a single machine tool on the shop floor.
/// PK = code (human-readable, e.g. "F1", "T2").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Machine code — primary key.
    pub code: String,

    /// Machining process.
    #[serde(rename = "type")]
    pub machine_type: MachineType,

    /// Simultaneous motion axes (typically 3 or 4).
    pub axes: u32,

    /// Available for scheduling at all. Machines referenced by historical
    /// shifts are deactivated, never deleted.
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Assignment state machine.
    #[serde(default)]
    pub state: MachineState,

    /// Kept in lockstep with `state`: occupied ⇔ state == OCCUPIED.
    /// Occupied implies active.
    #[serde(default)]
    pub is_occupied: bool,

    /// Bumped on every state write; writers compare-and-swap on it.
    #[serde(default)]
    pub version: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_json_roundtrip() {
        let m = Machine {
            code: "F1".into(),
            machine_type: MachineType::Milling,
            axes: 3,
            is_active: true,
            state: MachineState::Free,
            is_occupied: false,
            version: 0,
            display_name: None,
            description: None,
            create_at: None,
            update_at: None,
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: Machine = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
        // Wire field is "type", statuses are SCREAMING_SNAKE_CASE.
        assert!(json.contains("\"type\":\"MILLING\""));
        assert!(json.contains("\"state\":\"FREE\""));
    }

    #[test]
    fn state_roundtrip() {
        for s in &[MachineState::Free, MachineState::Reserved, MachineState::Occupied] {
            assert_eq!(MachineState::from_str(s.as_str()), Some(*s));
        }
        assert_eq!(MachineState::from_str("BUSY"), None);
    }

    #[test]
    fn type_roundtrip() {
        for t in &[MachineType::Milling, MachineType::Turning] {
            assert_eq!(MachineType::from_str(t.as_str()), Some(*t));
        }
    }
}
