//! Global shared state.
//!
//! State exchanged between the command task and the control loop, protected
//! by mutexes or passed through a channel.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use crate::ble_protocol::MotorCommand;
use crate::config::COMMAND_EPSILON;

/// Maximum raw frame size accepted from the transport.
pub const MAX_FRAME_LEN: usize = 64;

/// Raw frame as queued between the transport and the command decoder.
pub type RawFrame = Vec<u8, MAX_FRAME_LEN>;

/// Frames received from the transport, waiting to be decoded.
pub static FRAME_QUEUE: Channel<CriticalSectionRawMutex, RawFrame, 8> = Channel::new();

#[derive(Debug, Clone, Copy, PartialEq)]
struct Target {
    value: f32,
    dirty: bool,
}

/// Latest accepted target with a change flag, updated atomically.
///
/// The decoder publishes every decoded value; one is accepted only when it
/// moved by more than [`COMMAND_EPSILON`] from the last accepted value, so
/// a slow ramp of sub-threshold steps still actuates once the cumulative
/// change crosses the threshold. A rejected publish leaves the stored value
/// alone but clears the flag, so a stale flag cannot survive a repeated
/// command.
pub struct CommandChannel {
    inner: Mutex<CriticalSectionRawMutex, Cell<Target>>,
}

impl CommandChannel {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Target {
                value: 0.0,
                dirty: false,
            })),
        }
    }

    /// Offer a decoded value. Returns whether it was accepted and the
    /// change flag raised.
    pub fn publish(&self, value: f32) -> bool {
        self.inner.lock(|cell| {
            let previous = cell.get();
            let dirty = (value - previous.value).abs() > COMMAND_EPSILON;
            if dirty {
                cell.set(Target { value, dirty: true });
            } else {
                cell.set(Target {
                    dirty: false,
                    ..previous
                });
            }
            dirty
        })
    }

    /// Take the pending value, clearing the change flag.
    pub fn consume(&self) -> Option<f32> {
        self.inner.lock(|cell| {
            let current = cell.get();
            if current.dirty {
                cell.set(Target {
                    dirty: false,
                    ..current
                });
                Some(current.value)
            } else {
                None
            }
        })
    }

    /// Current stored value, flag untouched.
    pub fn peek(&self) -> f32 {
        self.inner.lock(|cell| cell.get().value)
    }
}

/// Commanded target for this device, debounced.
pub static COMMAND_TARGET: CommandChannel = CommandChannel::new();

/// Most recent MULTI_STRUCT command together with the item count of the
/// frame it arrived in.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StructCommandRecord {
    pub command: MotorCommand,
    pub item_count: u8,
}

/// Last command decoded from a MULTI_STRUCT frame, kept for status queries.
pub static LAST_STRUCT_COMMAND: Mutex<CriticalSectionRawMutex, Cell<Option<StructCommandRecord>>> =
    Mutex::new(Cell::new(None));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_raises_flag_on_change() {
        let channel = CommandChannel::new();
        assert!(channel.publish(1.0));
        assert_eq!(channel.consume(), Some(1.0));
    }

    #[test]
    fn test_consume_clears_flag() {
        let channel = CommandChannel::new();
        channel.publish(1.0);
        assert_eq!(channel.consume(), Some(1.0));
        assert_eq!(channel.consume(), None);
    }

    #[test]
    fn test_repeat_within_threshold_clears_flag() {
        let channel = CommandChannel::new();
        assert!(channel.publish(1.0));
        // A repeat below the threshold clears the still-pending flag; the
        // accepted value stays put.
        assert!(!channel.publish(1.0005));
        assert_eq!(channel.consume(), None);
        assert_eq!(channel.peek(), 1.0);
    }

    #[test]
    fn test_sub_threshold_ramp_eventually_accepted() {
        let channel = CommandChannel::new();
        channel.publish(5.0);
        channel.consume();

        // Single-LSB steps of a current command are 0.0009 each; the ramp
        // must actuate once the cumulative change passes the threshold.
        let mut accepted_at = None;
        for i in 1..=10 {
            let value = 5.0 + 0.0009 * i as f32;
            if channel.publish(value) {
                accepted_at = Some((i, value));
                break;
            }
        }

        let (i, value) = accepted_at.unwrap();
        assert_eq!(i, 2);
        assert_eq!(channel.consume(), Some(value));
    }

    #[test]
    fn test_last_write_wins() {
        let channel = CommandChannel::new();
        channel.publish(1.0);
        channel.publish(5.0);
        assert_eq!(channel.consume(), Some(5.0));
    }

    #[test]
    fn test_change_above_threshold_raises_flag() {
        let channel = CommandChannel::new();
        channel.publish(1.0);
        channel.consume();
        assert!(channel.publish(1.002));
        assert_eq!(channel.consume(), Some(1.002));
    }
}
