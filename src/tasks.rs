//! Async task layer.
//!
//! The owning firmware spawns these on its executor, handing in the
//! board-specific peripherals behind the hardware traits.

pub mod command;
pub mod motor_control;

pub use command::command_task;
pub use motor_control::motor_control_task;
