//! Capability matching — which machines can run an order.

use shop::model::{Machine, MachineState};

use crate::axis::{parse_axis_requirement, AxisRequirement};
use crate::model::Order;

/// Outcome of a capability match.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The axis requirement derived from the order's spec text.
    pub requirement: AxisRequirement,
    /// Eligible machines, best fit first.
    pub machines: Vec<Machine>,
}

/// Select the machines eligible for an order.
///
/// A machine qualifies when it is active, FREE, runs the order's process,
/// and has at least the required axis count. Results are sorted by axis
/// count ascending, then code: exact axis matches come before
/// higher-capability machines, so over-provisioning is minimized. An empty
/// result is a normal outcome — absence of capacity is for the caller to
/// handle, not an error.
pub fn match_machines(order: &Order, machines: &[Machine]) -> MatchResult {
    let requirement = parse_axis_requirement(&order.spec);
    let required = requirement.axes();

    let mut eligible: Vec<Machine> = machines
        .iter()
        .filter(|m| {
            m.is_active
                && m.state == MachineState::Free
                && m.machine_type == order.process_type
                && m.axes >= required
        })
        .cloned()
        .collect();

    eligible.sort_by(|a, b| a.axes.cmp(&b.axes).then_with(|| a.code.cmp(&b.code)));

    MatchResult {
        requirement,
        machines: eligible,
    }
}
