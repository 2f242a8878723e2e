use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use planwerk_core::{apply_patch, new_id, now_rfc3339, ListParams, ListResult, ServiceError};
use shop::model::{Machine, MachineState};
use shop::store::{MachineFilters, ShopStore};

use crate::axis::parse_axis_requirement;
use crate::matcher::{match_machines, MatchResult};
use crate::model::{
    CreateOrderRequest, CreateShiftRequest, Order, OrderStatus, Shift, ShiftListQuery,
    ShiftStatus,
};
use crate::store::{OrderFilters, PlanStore, ShiftFilters};

/// Attempts before giving up on a version-CAS race.
const CAS_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// PlanEngine — order intake + the per-machine assignment state machine
// ---------------------------------------------------------------------------

/// The planning engine.
///
/// Owns order intake and the shift state machine:
///
/// ```text
/// reserve   FREE → RESERVED      (shift RESERVED, expiring)
/// confirm   RESERVED → OCCUPIED  (shift OCCUPIED, machine occupied)
/// release   OCCUPIED → FREE      (shift RELEASED, kept for history)
/// cancel    RESERVED → FREE      (shift CANCELLED)
/// expiry    RESERVED → FREE      (shift EXPIRED, via watchdog)
/// ```
///
/// Machine transitions compare-and-swap on the row version; shift
/// transitions compare-and-swap on the status column. Conflicts surface to
/// the caller and are never retried here.
pub struct PlanEngine {
    store: Arc<PlanStore>,
    machines: Arc<ShopStore>,
    reservation_ttl: chrono::Duration,
}

impl PlanEngine {
    pub fn new(
        store: Arc<PlanStore>,
        machines: Arc<ShopStore>,
        reservation_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            machines,
            reservation_ttl: chrono::Duration::seconds(reservation_ttl_secs.max(1)),
        }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    // =======================================================================
    // Order intake
    // =======================================================================

    pub fn create_order(&self, req: CreateOrderRequest) -> Result<Order, ServiceError> {
        let drawing_number = req.drawing_number.trim();
        if drawing_number.is_empty() {
            return Err(ServiceError::Validation(
                "drawing number must not be empty".into(),
            ));
        }

        let requirement = parse_axis_requirement(&req.spec);
        if requirement.is_default() {
            warn!(
                "order {drawing_number}: requirement '{}' has no axis count, assuming {} axes",
                req.spec,
                requirement.axes()
            );
        }

        let order = Order {
            id: new_id(),
            drawing_number: drawing_number.to_string(),
            name: req.name,
            process_type: req.process_type,
            spec: req.spec,
            status: OrderStatus::Intake,
            customer: req.customer,
            description: req.description,
            create_at: Some(now_rfc3339()),
            update_at: None,
        };

        self.store.insert_order(&order)?;
        info!("order {} created", order.drawing_number);
        Ok(order)
    }

    pub fn get_order(&self, id: &str) -> Result<Order, ServiceError> {
        self.store.get_order(id)
    }

    pub fn list_orders(
        &self,
        params: &ListParams,
        filters: &OrderFilters,
    ) -> Result<ListResult<Order>, ServiceError> {
        self.store.list_orders(params, filters)
    }

    /// Merge-patch an order through its production stages. Identity fields
    /// are immutable.
    pub fn update_order(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Order, ServiceError> {
        let current = self.store.get_order(id)?;
        let patched: Order = apply_patch(&current, patch, &["id", "drawingNumber", "createAt"])?;
        self.store.update_order(&patched)?;
        Ok(patched)
    }

    /// Archive an order. Idempotent; archived orders take no new shifts.
    pub fn archive_order(&self, id: &str) -> Result<Order, ServiceError> {
        let mut order = self.store.get_order(id)?;
        if order.status == OrderStatus::Archived {
            return Ok(order);
        }
        order.status = OrderStatus::Archived;
        order.update_at = Some(now_rfc3339());
        self.store.update_order(&order)?;
        info!("order {} archived", order.drawing_number);
        Ok(order)
    }

    // =======================================================================
    // Capability matching
    // =======================================================================

    /// Machines currently eligible for an order, best fit first.
    pub fn candidates(&self, order_id: &str) -> Result<MatchResult, ServiceError> {
        let order = self.store.get_order(order_id)?;
        if order.status == OrderStatus::Archived {
            return Err(ServiceError::Validation(format!(
                "order '{}' is archived",
                order.drawing_number
            )));
        }

        let machines = self.machines.list_machines(&MachineFilters::default())?;
        let result = match_machines(&order, &machines);
        if result.requirement.is_default() {
            warn!(
                "order {}: requirement '{}' has no axis count, assuming {} axes",
                order.drawing_number,
                order.spec,
                result.requirement.axes()
            );
        }
        Ok(result)
    }

    // =======================================================================
    // Shift state machine
    // =======================================================================

    /// Reserve a machine for an order on a date: FREE → RESERVED.
    ///
    /// The reservation expires unless confirmed within the TTL. A machine
    /// that is not FREE, or a date already taken on that machine, is a
    /// Conflict.
    pub fn reserve(&self, req: CreateShiftRequest) -> Result<Shift, ServiceError> {
        let date = parse_date(&req.date)?;
        let date_str = date.format("%Y-%m-%d").to_string();

        let order = self.store.get_order(&req.order_id)?;
        if order.status == OrderStatus::Archived {
            return Err(ServiceError::Validation(format!(
                "order '{}' is archived",
                order.drawing_number
            )));
        }

        let operator = self.machines.get_operator(&req.operator_id)?;
        let machine = self.machines.get_machine(&req.machine_code)?;

        if !machine.is_active {
            return Err(ServiceError::Validation(format!(
                "machine '{}' is inactive",
                machine.code
            )));
        }
        if machine.machine_type != order.process_type {
            return Err(ServiceError::Validation(format!(
                "machine '{}' is {}, order '{}' needs {}",
                machine.code, machine.machine_type, order.drawing_number, order.process_type
            )));
        }

        let requirement = parse_axis_requirement(&order.spec);
        if requirement.is_default() {
            warn!(
                "order {}: requirement '{}' has no axis count, assuming {} axes",
                order.drawing_number,
                order.spec,
                requirement.axes()
            );
        }
        if machine.axes < requirement.axes() {
            return Err(ServiceError::Validation(format!(
                "machine '{}' has {} axes, order '{}' needs {}",
                machine.code,
                machine.axes,
                order.drawing_number,
                requirement.axes()
            )));
        }
        if !operator.operator_type.can_run(machine.machine_type) {
            return Err(ServiceError::Validation(format!(
                "operator '{}' is not qualified for {}",
                operator.name, machine.machine_type
            )));
        }

        if machine.state != MachineState::Free {
            return Err(ServiceError::Conflict(format!(
                "machine '{}' is {}",
                machine.code, machine.state
            )));
        }
        if self.store.date_blocked(&machine.code, &date_str)? {
            return Err(ServiceError::Conflict(format!(
                "machine '{}' is already scheduled on {}",
                machine.code, date_str
            )));
        }

        // CAS FREE → RESERVED. Exactly one of two racing callers gets here
        // with the version it read still current.
        let reserved_machine = {
            let mut m = machine.clone();
            m.state = MachineState::Reserved;
            self.machines.cas_update(&m)?.ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "machine '{}' was taken concurrently",
                    machine.code
                ))
            })?
        };

        let now = Utc::now();
        let shift = Shift {
            id: new_id(),
            order_id: order.id.clone(),
            drawing_number: order.drawing_number.clone(),
            machine_code: machine.code.clone(),
            operator_id: operator.id.clone(),
            date: date_str,
            status: ShiftStatus::Reserved,
            expires_at: Some((now + self.reservation_ttl).to_rfc3339()),
            create_at: now.to_rfc3339(),
            confirmed_at: None,
            released_at: None,
        };

        if let Err(e) = self.store.insert_shift(&shift) {
            // No ghost RESERVED machine may outlive a failed insert.
            let mut back = reserved_machine;
            back.state = MachineState::Free;
            match self.machines.cas_update(&back) {
                Ok(Some(_)) => {}
                Ok(None) => error!(
                    "machine {} rollback lost a race after failed shift insert",
                    back.code
                ),
                Err(rollback_err) => error!(
                    "machine {} rollback failed after failed shift insert: {rollback_err}",
                    back.code
                ),
            }
            return Err(e);
        }

        info!(
            "machine {} reserved for order {} on {} (shift {})",
            shift.machine_code, shift.drawing_number, shift.date, shift.id
        );
        Ok(shift)
    }

    /// Confirm a reservation: RESERVED → OCCUPIED on both shift and machine.
    pub fn confirm(&self, shift_id: &str) -> Result<Shift, ServiceError> {
        let shift = self.store.get_shift(shift_id)?;
        if shift.status != ShiftStatus::Reserved {
            return Err(ServiceError::Conflict(format!(
                "shift {shift_id} is {}, not RESERVED",
                shift.status
            )));
        }

        if reservation_lapsed(&shift, Utc::now()) {
            // Sweep it now instead of leaving it to the watchdog.
            self.expire_shift(&shift)?;
            return Err(ServiceError::Conflict(format!(
                "reservation {shift_id} expired"
            )));
        }

        let mut confirmed = shift.clone();
        confirmed.status = ShiftStatus::Occupied;
        confirmed.expires_at = None;
        confirmed.confirmed_at = Some(now_rfc3339());

        if !self.store.cas_shift(&confirmed, ShiftStatus::Reserved)? {
            return Err(ServiceError::Conflict(format!(
                "shift {shift_id} is no longer reserved"
            )));
        }

        if let Err(e) =
            self.transition_machine(&shift.machine_code, MachineState::Reserved, MachineState::Occupied)
        {
            // Roll the shift back so the reservation stays claimable.
            if !self.store.cas_shift(&shift, ShiftStatus::Occupied).unwrap_or(false) {
                error!("shift {shift_id} rollback failed after machine transition error");
            }
            return Err(e);
        }

        info!(
            "shift {} confirmed: machine {} occupied for order {}",
            shift_id, shift.machine_code, shift.drawing_number
        );
        Ok(confirmed)
    }

    /// Release a confirmed shift: OCCUPIED → FREE. The shift row is kept
    /// for history.
    pub fn release(&self, shift_id: &str) -> Result<Shift, ServiceError> {
        let shift = self.store.get_shift(shift_id)?;
        if shift.status != ShiftStatus::Occupied {
            return Err(ServiceError::Conflict(format!(
                "shift {shift_id} is {}, not OCCUPIED",
                shift.status
            )));
        }

        let mut released = shift.clone();
        released.status = ShiftStatus::Released;
        released.released_at = Some(now_rfc3339());

        if !self.store.cas_shift(&released, ShiftStatus::Occupied)? {
            return Err(ServiceError::Conflict(format!(
                "shift {shift_id} is no longer occupied"
            )));
        }

        if let Err(e) = self.free_machine(&shift.machine_code, MachineState::Occupied) {
            if !self.store.cas_shift(&shift, ShiftStatus::Released).unwrap_or(false) {
                error!("shift {shift_id} rollback failed after machine release error");
            }
            return Err(e);
        }

        info!(
            "shift {} released: machine {} free again",
            shift_id, shift.machine_code
        );
        Ok(released)
    }

    /// Abandon a reservation before confirm: RESERVED → FREE.
    pub fn cancel(&self, shift_id: &str) -> Result<Shift, ServiceError> {
        let shift = self.store.get_shift(shift_id)?;
        if shift.status != ShiftStatus::Reserved {
            return Err(ServiceError::Conflict(format!(
                "shift {shift_id} is {}, not RESERVED",
                shift.status
            )));
        }

        let mut cancelled = shift.clone();
        cancelled.status = ShiftStatus::Cancelled;
        cancelled.expires_at = None;

        if !self.store.cas_shift(&cancelled, ShiftStatus::Reserved)? {
            return Err(ServiceError::Conflict(format!(
                "shift {shift_id} is no longer reserved"
            )));
        }

        if let Err(e) = self.free_machine(&shift.machine_code, MachineState::Reserved) {
            if !self.store.cas_shift(&shift, ShiftStatus::Cancelled).unwrap_or(false) {
                error!("shift {shift_id} rollback failed after machine release error");
            }
            return Err(e);
        }

        info!("shift {} cancelled", shift_id);
        Ok(cancelled)
    }

    // =======================================================================
    // Query / calendar
    // =======================================================================

    pub fn get_shift(&self, id: &str) -> Result<Shift, ServiceError> {
        self.store.get_shift(id)
    }

    /// The calendar read path: shifts in `[startDate, endDate]` inclusive,
    /// ordered by date then machine code.
    pub fn list_shifts(&self, query: &ShiftListQuery) -> Result<Vec<Shift>, ServiceError> {
        let start = query
            .start_date
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("startDate is required".into()))?;
        let end = query
            .end_date
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("endDate is required".into()))?;

        let start_date = parse_date(start)?;
        let end_date = parse_date(end)?;
        if end_date < start_date {
            return Err(ServiceError::Validation(format!(
                "endDate {end} is before startDate {start}"
            )));
        }

        if let Some(ref s) = query.status {
            if ShiftStatus::from_str(s).is_none() {
                return Err(ServiceError::Validation(format!(
                    "unknown shift status '{s}'"
                )));
            }
        }

        let filters = ShiftFilters {
            machine_code: query.machine_code.clone(),
            operator_id: query.operator_id.clone(),
            order_id: query.order_id.clone(),
            status: query.status.clone(),
        };
        self.store.list_shifts(
            &start_date.format("%Y-%m-%d").to_string(),
            &end_date.format("%Y-%m-%d").to_string(),
            &filters,
        )
    }

    // =======================================================================
    // Watchdog
    // =======================================================================

    /// Sweep RESERVED shifts whose TTL lapsed: mark them EXPIRED and free
    /// their machines. An abandoned reservation can never wedge a machine.
    pub fn expire_reservations(&self) -> Result<u32, ServiceError> {
        let now = Utc::now();
        let mut expired = 0u32;

        for shift in self.store.reserved_shifts()? {
            if !reservation_lapsed(&shift, now) {
                continue;
            }
            match self.expire_shift(&shift) {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => error!("expiry of shift {} failed: {e}", shift.id),
            }
        }

        Ok(expired)
    }

    /// Expire one reservation. Returns `false` when someone else (confirm,
    /// cancel, another sweep) transitioned it first.
    fn expire_shift(&self, shift: &Shift) -> Result<bool, ServiceError> {
        let mut lapsed = shift.clone();
        lapsed.status = ShiftStatus::Expired;
        lapsed.expires_at = None;

        if !self.store.cas_shift(&lapsed, ShiftStatus::Reserved)? {
            return Ok(false);
        }

        if let Err(e) = self.free_machine(&shift.machine_code, MachineState::Reserved) {
            error!(
                "machine {} could not be freed after reservation expiry: {e}",
                shift.machine_code
            );
        }

        info!(
            "reservation {} for machine {} expired",
            shift.id, shift.machine_code
        );
        Ok(true)
    }

    // =======================================================================
    // Machine transitions
    // =======================================================================

    /// CAS a machine from `from` to `to`, retrying version races from
    /// unrelated writers (descriptive patches) a few times.
    fn transition_machine(
        &self,
        code: &str,
        from: MachineState,
        to: MachineState,
    ) -> Result<Machine, ServiceError> {
        for _ in 0..CAS_ATTEMPTS {
            let mut machine = self.machines.get_machine(code)?;
            if machine.state != from {
                return Err(ServiceError::Conflict(format!(
                    "machine '{code}' is {}, expected {from}",
                    machine.state
                )));
            }
            machine.state = to;
            if let Some(updated) = self.machines.cas_update(&machine)? {
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "machine '{code}' was updated concurrently, retry"
        )))
    }

    /// Return a machine to FREE from `from`. A machine already FREE (an
    /// admin override got there first) is fine.
    fn free_machine(&self, code: &str, from: MachineState) -> Result<(), ServiceError> {
        for _ in 0..CAS_ATTEMPTS {
            let mut machine = self.machines.get_machine(code)?;
            if machine.state == MachineState::Free {
                warn!("machine '{code}' was already free");
                return Ok(());
            }
            if machine.state != from {
                return Err(ServiceError::Conflict(format!(
                    "machine '{code}' is {}, expected {from}",
                    machine.state
                )));
            }
            machine.state = MachineState::Free;
            if self.machines.cas_update(&machine)?.is_some() {
                return Ok(());
            }
        }
        Err(ServiceError::Conflict(format!(
            "machine '{code}' was updated concurrently, retry"
        )))
    }
}

/// Whether a RESERVED shift's TTL has lapsed at `now`.
fn reservation_lapsed(shift: &Shift, now: DateTime<Utc>) -> bool {
    let Some(ref exp) = shift.expires_at else {
        return false;
    };
    match DateTime::parse_from_rfc3339(exp) {
        Ok(at) => at.with_timezone(&Utc) <= now,
        Err(_) => false,
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ServiceError::Validation(format!("invalid date '{s}', expected YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwerk_sql::SqliteStore;
    use shop::model::{MachineType, Operator, OperatorType};
    use shop::service::{RegisterMachineRequest, ShopService};

    struct Fixture {
        engine: Arc<PlanEngine>,
        shop: ShopService,
    }

    fn fixture() -> Fixture {
        let db: Arc<dyn planwerk_sql::SQLStore> =
            Arc::new(SqliteStore::open_in_memory().unwrap());
        let machines = Arc::new(ShopStore::new(Arc::clone(&db)).unwrap());
        let store = Arc::new(PlanStore::new(db).unwrap());
        Fixture {
            engine: Arc::new(PlanEngine::new(store, Arc::clone(&machines), 900)),
            shop: ShopService::new(machines),
        }
    }

    fn seed_machine(f: &Fixture, code: &str, machine_type: MachineType, axes: u32) {
        f.shop
            .register_machine(RegisterMachineRequest {
                code: code.into(),
                machine_type,
                axes,
                display_name: None,
                description: None,
            })
            .unwrap();
    }

    fn seed_operator(f: &Fixture, id: &str, operator_type: OperatorType) {
        f.shop
            .store()
            .insert_operator(&Operator {
                id: id.into(),
                name: format!("operator {id}"),
                operator_type,
                create_at: Some(now_rfc3339()),
                update_at: None,
            })
            .unwrap();
    }

    fn seed_order(f: &Fixture, drawing_number: &str, spec: &str) -> Order {
        f.engine
            .create_order(CreateOrderRequest {
                drawing_number: drawing_number.into(),
                name: None,
                process_type: MachineType::Milling,
                spec: spec.into(),
                customer: None,
                description: None,
            })
            .unwrap()
    }

    fn reserve_req(order: &Order, machine: &str, date: &str) -> CreateShiftRequest {
        CreateShiftRequest {
            order_id: order.id.clone(),
            machine_code: machine.into(),
            operator_id: "op1".into(),
            date: date.into(),
        }
    }

    fn standard_fixture() -> (Fixture, Order) {
        let f = fixture();
        seed_machine(&f, "F1", MachineType::Milling, 3);
        seed_operator(&f, "op1", OperatorType::Both);
        let order = seed_order(&f, "DRW-1", "3-axis milling");
        (f, order)
    }

    #[test]
    fn reserve_confirm_release_lifecycle() {
        let (f, order) = standard_fixture();

        let shift = f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
        assert_eq!(shift.status, ShiftStatus::Reserved);
        assert!(shift.expires_at.is_some());
        let m = f.shop.get_machine("F1").unwrap();
        assert_eq!(m.state, MachineState::Reserved);
        assert!(!m.is_occupied);

        let confirmed = f.engine.confirm(&shift.id).unwrap();
        assert_eq!(confirmed.status, ShiftStatus::Occupied);
        assert!(confirmed.expires_at.is_none());
        let m = f.shop.get_machine("F1").unwrap();
        assert_eq!(m.state, MachineState::Occupied);
        assert!(m.is_occupied);
        assert!(m.is_active, "occupied implies active");

        let released = f.engine.release(&shift.id).unwrap();
        assert_eq!(released.status, ShiftStatus::Released);
        let m = f.shop.get_machine("F1").unwrap();
        assert_eq!(m.state, MachineState::Free);
        assert!(!m.is_occupied);

        // The shift row survives release.
        assert_eq!(
            f.engine.get_shift(&shift.id).unwrap().status,
            ShiftStatus::Released
        );
    }

    #[test]
    fn released_date_stays_blocked_other_dates_open() {
        let (f, order) = standard_fixture();
        let order2 = seed_order(&f, "DRW-2", "3-axis milling");

        let shift = f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
        f.engine.confirm(&shift.id).unwrap();
        f.engine.release(&shift.id).unwrap();

        let err = f
            .engine
            .reserve(reserve_req(&order2, "F1", "2024-03-15"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        f.engine
            .reserve(reserve_req(&order2, "F1", "2024-03-16"))
            .unwrap();
    }

    #[test]
    fn cancel_frees_the_slot() {
        let (f, order) = standard_fixture();

        let shift = f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
        let cancelled = f.engine.cancel(&shift.id).unwrap();
        assert_eq!(cancelled.status, ShiftStatus::Cancelled);
        assert_eq!(f.shop.get_machine("F1").unwrap().state, MachineState::Free);

        // The same machine and date are reservable again.
        f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
    }

    #[test]
    fn second_reserve_for_busy_machine_conflicts() {
        let (f, order) = standard_fixture();
        let order2 = seed_order(&f, "DRW-2", "3-axis milling");

        f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
        let err = f
            .engine
            .reserve(reserve_req(&order2, "F1", "2024-03-16"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn concurrent_reserves_have_exactly_one_winner() {
        let (f, order) = standard_fixture();
        let order2 = seed_order(&f, "DRW-2", "3-axis milling");

        let e1 = Arc::clone(&f.engine);
        let e2 = Arc::clone(&f.engine);
        let r1 = reserve_req(&order, "F1", "2024-03-15");
        let r2 = reserve_req(&order2, "F1", "2024-03-15");

        let t1 = std::thread::spawn(move || e1.reserve(r1));
        let t2 = std::thread::spawn(move || e2.reserve(r2));
        let results = [t1.join().unwrap(), t2.join().unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "exactly one reservation must win");
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, ServiceError::Conflict(_)), "loser gets a Conflict");
            }
        }

        // The winner owns the machine; no ghost reservation.
        let m = f.shop.get_machine("F1").unwrap();
        assert_eq!(m.state, MachineState::Reserved);
        let winner = results.iter().flatten().next().unwrap();
        assert_eq!(
            f.engine.get_shift(&winner.id).unwrap().status,
            ShiftStatus::Reserved
        );
    }

    #[test]
    fn expired_reservation_is_swept_and_machine_freed() {
        let (f, order) = standard_fixture();

        let shift = f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();

        // Force the TTL into the past.
        let mut stale = shift.clone();
        stale.expires_at = Some((Utc::now() - chrono::Duration::seconds(1)).to_rfc3339());
        assert!(f
            .engine
            .store()
            .cas_shift(&stale, ShiftStatus::Reserved)
            .unwrap());

        let swept = f.engine.expire_reservations().unwrap();
        assert_eq!(swept, 1);
        assert_eq!(
            f.engine.get_shift(&shift.id).unwrap().status,
            ShiftStatus::Expired
        );
        assert_eq!(f.shop.get_machine("F1").unwrap().state, MachineState::Free);

        // A lapsed reservation cannot be confirmed.
        let err = f.engine.confirm(&shift.id).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // The slot opens up again.
        f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
    }

    #[test]
    fn confirm_after_ttl_expires_inline() {
        let (f, order) = standard_fixture();

        let shift = f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
        let mut stale = shift.clone();
        stale.expires_at = Some((Utc::now() - chrono::Duration::seconds(1)).to_rfc3339());
        assert!(f
            .engine
            .store()
            .cas_shift(&stale, ShiftStatus::Reserved)
            .unwrap());

        let err = f.engine.confirm(&shift.id).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(
            f.engine.get_shift(&shift.id).unwrap().status,
            ShiftStatus::Expired
        );
        assert_eq!(f.shop.get_machine("F1").unwrap().state, MachineState::Free);
    }

    #[test]
    fn reserve_validates_inputs() {
        let (f, order) = standard_fixture();

        let err = f
            .engine
            .reserve(reserve_req(&order, "F1", "15.03.2024"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = f
            .engine
            .reserve(reserve_req(&order, "F9", "2024-03-15"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let mut req = reserve_req(&order, "F1", "2024-03-15");
        req.operator_id = "ghost".into();
        let err = f.engine.reserve(req).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn reserve_rejects_unqualified_operator_and_wrong_process() {
        let f = fixture();
        seed_machine(&f, "F1", MachineType::Milling, 3);
        seed_machine(&f, "T1", MachineType::Turning, 3);
        seed_operator(&f, "op1", OperatorType::Turning);
        let order = seed_order(&f, "DRW-1", "3-axis milling");

        // Milling order on a turning machine.
        let err = f
            .engine
            .reserve(reserve_req(&order, "T1", "2024-03-15"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Turning-only operator on a milling machine.
        let err = f
            .engine
            .reserve(reserve_req(&order, "F1", "2024-03-15"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn reserve_rejects_insufficient_axes() {
        let f = fixture();
        seed_machine(&f, "F1", MachineType::Milling, 3);
        seed_operator(&f, "op1", OperatorType::Both);
        let order = seed_order(&f, "DRW-1", "4-axis milling");

        let err = f
            .engine
            .reserve(reserve_req(&order, "F1", "2024-03-15"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn unparseable_spec_reserves_with_default_axes() {
        let f = fixture();
        seed_machine(&f, "F1", MachineType::Milling, 3);
        seed_operator(&f, "op1", OperatorType::Both);
        let order = seed_order(&f, "DRW-1", "unspecified");

        // Default is 3 axes; the 3-axis machine qualifies.
        f.engine.reserve(reserve_req(&order, "F1", "2024-03-15")).unwrap();
    }

    #[test]
    fn archived_order_takes_no_shifts() {
        let (f, order) = standard_fixture();
        f.engine.archive_order(&order.id).unwrap();

        let err = f
            .engine
            .reserve(reserve_req(&order, "F1", "2024-03-15"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn duplicate_drawing_number_conflicts() {
        let (f, _order) = standard_fixture();
        let err = f
            .engine
            .create_order(CreateOrderRequest {
                drawing_number: "DRW-1".into(),
                name: None,
                process_type: MachineType::Milling,
                spec: String::new(),
                customer: None,
                description: None,
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn order_patch_protects_identity() {
        let (f, order) = standard_fixture();
        let patched = f
            .engine
            .update_order(
                &order.id,
                serde_json::json!({
                    "status": "IN_PRODUCTION",
                    "drawingNumber": "HIJACKED",
                    "id": "nope"
                }),
            )
            .unwrap();
        assert_eq!(patched.status, OrderStatus::InProduction);
        assert_eq!(patched.drawing_number, "DRW-1");
        assert_eq!(patched.id, order.id);
    }

    #[test]
    fn candidates_prefer_exact_axis_match() {
        let f = fixture();
        seed_machine(&f, "F5", MachineType::Milling, 5);
        seed_machine(&f, "F3", MachineType::Milling, 3);
        seed_operator(&f, "op1", OperatorType::Both);
        let order = seed_order(&f, "DRW-1", "3-axis milling");

        let result = f.engine.candidates(&order.id).unwrap();
        let codes: Vec<_> = result.machines.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["F3", "F5"]);
    }

    #[test]
    fn list_shifts_validates_range() {
        let (f, _order) = standard_fixture();

        let err = f
            .engine
            .list_shifts(&ShiftListQuery {
                start_date: Some("2024-02-01".into()),
                end_date: Some("2024-01-01".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = f
            .engine
            .list_shifts(&ShiftListQuery {
                start_date: Some("not-a-date".into()),
                end_date: Some("2024-01-01".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = f
            .engine
            .list_shifts(&ShiftListQuery {
                end_date: Some("2024-01-01".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn list_shifts_inclusive_bounds() {
        let (f, order) = standard_fixture();
        seed_machine(&f, "F2", MachineType::Milling, 3);
        let order2 = seed_order(&f, "DRW-2", "3-axis milling");

        f.engine.reserve(reserve_req(&order, "F1", "2024-03-14")).unwrap();
        f.engine.reserve(reserve_req(&order2, "F2", "2024-03-16")).unwrap();

        let shifts = f
            .engine
            .list_shifts(&ShiftListQuery {
                start_date: Some("2024-03-14".into()),
                end_date: Some("2024-03-16".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(shifts.len(), 2);
        assert_eq!(shifts[0].date, "2024-03-14");
        assert_eq!(shifts[1].date, "2024-03-16");
    }
}
