//! Command decoding task.
//!
//! Drains raw frames from the transport queue, decodes them on behalf of
//! this device and publishes the resulting target for the control loop.
//! Responses go back out on the transport when a peer is connected.

use crate::ble_protocol::decode_frame;
use crate::config::ScaleConfig;
use crate::fmt::*;
use crate::hardware::Transport;
use crate::state::{StructCommandRecord, COMMAND_TARGET, FRAME_QUEUE, LAST_STRUCT_COMMAND};

/// Decode frames forever. Generic over the transport so the BLE stack and
/// the test harness plug in the same way.
pub async fn command_task<T: Transport>(mut transport: T, device_id: u8, scales: ScaleConfig) -> ! {
    info!("Command task started, device id {}", device_id);

    loop {
        let frame = FRAME_QUEUE.receive().await;
        process_frame(&mut transport, &frame, device_id, &scales);
    }
}

/// Handle one raw frame: decode, record, publish, respond.
pub fn process_frame<T: Transport>(
    transport: &mut T,
    frame: &[u8],
    device_id: u8,
    scales: &ScaleConfig,
) {
    let result = decode_frame(frame, device_id, scales);

    if let Some(command) = result.command {
        if let Some(item_count) = result.struct_count {
            LAST_STRUCT_COMMAND.lock(|cell| {
                cell.set(Some(StructCommandRecord {
                    command,
                    item_count,
                }))
            });
        }

        let raised = COMMAND_TARGET.publish(command.value);
        debug!(
            "Command {:?} value {} (changed: {})",
            command.kind, command.value, raised
        );
    }

    if let Some(response) = result.response {
        if transport.is_connected() {
            transport.send(response.as_bytes());
        } else {
            debug!("No peer connected, response dropped");
        }
    }
}
