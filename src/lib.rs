#![no_std]

// Control core of a BLE-addressed single-axis BLDC controller.
// The transport and the peripherals live in the owning firmware crate,
// behind the traits in `hardware`.

pub(crate) mod fmt;

pub mod ble_protocol;
pub mod config;
pub mod foc;
pub mod hardware;
pub mod state;
pub mod tasks;

pub use ble_protocol::{decode_frame, DataKind, DecodeResult, MotorCommand, PacketType};
pub use foc::motor::FocMotor;
pub use state::{CommandChannel, COMMAND_TARGET, FRAME_QUEUE};
