pub mod order;
pub mod shift;

pub use order::{CreateOrderRequest, Order, OrderStatus};
pub use shift::{CreateShiftRequest, Shift, ShiftListQuery, ShiftStatus};
