pub mod machine;
pub mod operator;

pub use machine::{Machine, MachineState, MachineType};
pub use operator::{Operator, OperatorType};
