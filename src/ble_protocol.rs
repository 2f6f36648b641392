// BLE command protocol for fleet-addressed motor control.
//
// Several controllers share one command channel; every frame is decoded by
// every device and addressing decides who acts on it. Three packet layouts
// exist on the wire (single-target, multi-target slice/legacy, multi-target
// struct), all carrying big-endian quantized i16 values.

use core::fmt::Write;

use heapless::String;

use crate::config::{ScaleConfig, MAX_MOTORS};
use crate::fmt::*;

/// Wire-level constants shared with the commanding clients.
pub mod wire {
    /// Optional frame marker prefix.
    pub const MARKER: [u8; 2] = [0xAA, 0x55];

    /// Single-motor command packet.
    pub const PACKET_TYPE_SINGLE: u8 = 0x01;

    /// Multi-motor batch packet (slice or legacy ten-slot layout).
    pub const PACKET_TYPE_MULTI: u8 = 0x02;

    /// Multi-motor packet with explicit (id, value) items.
    pub const PACKET_TYPE_MULTI_STRUCT: u8 = 0x03;

    /// Data kind codes.
    pub const DATA_KIND_ANGLE: u8 = 0x01;
    pub const DATA_KIND_VELOCITY: u8 = 0x02;
    pub const DATA_KIND_CURRENT: u8 = 0x03;

    /// Total length of the legacy fixed MULTI frame: marker + type + kind
    /// + ten 2-byte slots for device ids 1..=10.
    pub const MULTI_LEGACY_LEN: usize = 24;

    /// Device ids covered by the legacy fixed MULTI frame.
    pub const MULTI_LEGACY_SLOTS: u8 = 10;
}

/// Packet type decoded from the type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    Single,
    Multi,
    MultiStruct,
    Unknown(u8),
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            wire::PACKET_TYPE_SINGLE => Self::Single,
            wire::PACKET_TYPE_MULTI => Self::Multi,
            wire::PACKET_TYPE_MULTI_STRUCT => Self::MultiStruct,
            other => Self::Unknown(other),
        }
    }

    fn is_known(byte: u8) -> bool {
        !matches!(Self::from_byte(byte), Self::Unknown(_))
    }
}

/// Physical meaning of the quantized value, bound to a wire scale.
///
/// Unrecognized kind bytes scale like angles but stay tagged with the raw
/// byte for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataKind {
    Angle,
    Velocity,
    Current,
    Unrecognized(u8),
}

impl DataKind {
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            wire::DATA_KIND_ANGLE => Self::Angle,
            wire::DATA_KIND_VELOCITY => Self::Velocity,
            wire::DATA_KIND_CURRENT => Self::Current,
            other => Self::Unrecognized(other),
        }
    }

    /// The scale factor this kind decodes with. Exactly one scale applies
    /// per command.
    pub fn scale(&self, scales: &ScaleConfig) -> f32 {
        match self {
            Self::Angle | Self::Unrecognized(_) => scales.angle,
            Self::Velocity => scales.velocity,
            Self::Current => scales.current,
        }
    }
}

/// Quantize a physical value to the wire i16, truncating toward zero and
/// saturating at the i16 range.
pub fn quantize(value: f32, scale: f32) -> i16 {
    let scaled = (value * scale) as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Recover the physical value from a wire i16.
pub fn dequantize(code: i16, scale: f32) -> f32 {
    code as f32 / scale
}

/// A command addressed to this device, fully decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorCommand {
    pub device_id: u8,
    pub kind: DataKind,
    /// The wire value before scaling.
    pub raw: i16,
    /// The physical target value.
    pub value: f32,
}

/// ASCII acknowledgement/error frame sent back over the transport.
pub type ResponseString = String<RESPONSE_CAPACITY>;
pub const RESPONSE_CAPACITY: usize = 48;

/// Outcome of decoding one raw frame.
///
/// `command` is present only when the frame addressed this device and was
/// well-formed. `response` may be present without a command (unknown packet
/// types are always answered). `struct_count` carries the item count of a
/// MULTI_STRUCT frame for introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    pub command: Option<MotorCommand>,
    pub response: Option<ResponseString>,
    pub struct_count: Option<u8>,
}

impl DecodeResult {
    /// Frame dropped: no update, no response.
    const fn dropped() -> Self {
        Self {
            command: None,
            response: None,
            struct_count: None,
        }
    }
}

/// Decode one raw command frame on behalf of device `my_id`.
///
/// Pure function: publishing the target and transmitting the response are
/// left to the caller so the wire formats stay independently testable.
///
/// # Arguments
/// * `frame` - raw bytes as received from the transport
/// * `my_id` - this device's id (1..=MAX_MOTORS)
/// * `scales` - wire scale factors per data kind
pub fn decode_frame(frame: &[u8], my_id: u8, scales: &ScaleConfig) -> DecodeResult {
    // Shortest parseable frame: type byte plus two fields.
    if frame.len() < 3 {
        error!("Command frame too short: {} bytes", frame.len());
        return DecodeResult::dropped();
    }

    // A marker only counts as a header when a known type byte follows;
    // otherwise the marker bytes are ordinary payload (deliberate fallback).
    let headered =
        frame.len() >= 3 && frame[..2] == wire::MARKER && PacketType::is_known(frame[2]);

    let type_byte = if headered { frame[2] } else { frame[0] };

    match PacketType::from_byte(type_byte) {
        PacketType::Single => decode_single(frame, headered, my_id, scales),
        PacketType::Multi => decode_multi(frame, headered, my_id, scales),
        PacketType::MultiStruct => decode_multi_struct(frame, headered, my_id, scales),
        PacketType::Unknown(byte) => {
            // Unknown types are never silently dropped, regardless of
            // addressing.
            error!("Unknown packet type: 0x{:02X}", byte);
            DecodeResult {
                command: None,
                response: Some(error_response(my_id)),
                struct_count: None,
            }
        }
    }
}

/// SINGLE: one device, one value.
///
/// Headered (7 bytes): `AA 55 01 KIND ID VH VL`.
/// Headerless (6 bytes): `01 ID KIND VH VL 00`.
fn decode_single(frame: &[u8], headered: bool, my_id: u8, scales: &ScaleConfig) -> DecodeResult {
    let min_len = if headered { 7 } else { 6 };
    if frame.len() < min_len {
        error!(
            "SINGLE frame too short: need {}, got {}",
            min_len,
            frame.len()
        );
        return DecodeResult::dropped();
    }

    let (kind_offset, id_offset, value_offset) = if headered { (3, 4, 5) } else { (2, 1, 3) };

    let target_id = frame[id_offset];
    if target_id != my_id {
        // Address filtering on a shared channel: not ours, say nothing.
        debug!("SINGLE for device {}, we are {}", target_id, my_id);
        return DecodeResult::dropped();
    }

    let kind = DataKind::from_wire(frame[kind_offset]);
    let raw = read_i16_be(frame, value_offset);
    let value = dequantize(raw, kind.scale(scales));

    debug!("SINGLE for us: raw={}, value={}", raw, value);

    DecodeResult {
        command: Some(MotorCommand {
            device_id: my_id,
            kind,
            raw,
            value,
        }),
        response: Some(ack_response(my_id, "SINGLE", value)),
        struct_count: None,
    }
}

/// MULTI: batch of consecutive devices, slice layout preferred.
///
/// Slice (headered only): `AA 55 02 KIND START_ID COUNT V..V`,
/// exactly `6 + COUNT*2` bytes.
/// Legacy (headered only): `AA 55 02 KIND V1..V10`, exactly 24 bytes,
/// fixed slots for device ids 1..=10.
fn decode_multi(frame: &[u8], headered: bool, my_id: u8, scales: &ScaleConfig) -> DecodeResult {
    let kind_offset = if headered { 3 } else { 1 };
    if frame.len() <= kind_offset {
        error!("MULTI frame has no data kind: {} bytes", frame.len());
        return DecodeResult::dropped();
    }

    let kind = DataKind::from_wire(frame[kind_offset]);
    let scale = kind.scale(scales);

    // Slice layout first; the legacy layout is only reached when the slice
    // constraints fail. Precedence preserved from the deployed protocol.
    if headered && frame.len() >= 6 {
        let start_id = frame[kind_offset + 1];
        let count = frame[kind_offset + 2];
        let data_start = kind_offset + 3;

        let ids_ok = (1..=MAX_MOTORS).contains(&start_id) && count >= 1;
        let len_ok = frame.len() == data_start + count as usize * 2;

        if ids_ok && len_ok {
            let end_id = start_id as u16 + count as u16 - 1;
            if (my_id as u16) < start_id as u16 || (my_id as u16) > end_id {
                debug!(
                    "MULTI slice covers {}..={}, we are {}",
                    start_id, end_id, my_id
                );
                return DecodeResult::dropped();
            }

            let index = (my_id - start_id) as usize;
            let raw = read_i16_be(frame, data_start + index * 2);
            let value = dequantize(raw, scale);

            debug!("MULTI slice slot {}: raw={}, value={}", index, raw, value);

            return DecodeResult {
                command: Some(MotorCommand {
                    device_id: my_id,
                    kind,
                    raw,
                    value,
                }),
                response: Some(ack_response(my_id, "MULTI", value)),
                struct_count: None,
            };
        }
    }

    if headered && frame.len() == wire::MULTI_LEGACY_LEN {
        if !(1..=wire::MULTI_LEGACY_SLOTS).contains(&my_id) {
            debug!("legacy MULTI has no slot for device {}", my_id);
            return DecodeResult::dropped();
        }

        let data_start = kind_offset + 1;
        let raw = read_i16_be(frame, data_start + (my_id - 1) as usize * 2);
        let value = dequantize(raw, scale);

        debug!("legacy MULTI slot {}: raw={}, value={}", my_id - 1, raw, value);

        return DecodeResult {
            command: Some(MotorCommand {
                device_id: my_id,
                kind,
                raw,
                value,
            }),
            response: Some(ack_response(my_id, "MULTI", value)),
            struct_count: None,
        };
    }

    error!(
        "MULTI frame matches neither slice nor legacy layout: {} bytes",
        frame.len()
    );
    DecodeResult::dropped()
}

/// MULTI_STRUCT: explicit (id, value) items, linear scan, first match wins.
///
/// Headered: `AA 55 03 KIND COUNT [ID VH VL]*COUNT`; headerless drops the
/// marker.
fn decode_multi_struct(
    frame: &[u8],
    headered: bool,
    my_id: u8,
    scales: &ScaleConfig,
) -> DecodeResult {
    let kind_offset = if headered { 3 } else { 1 };
    let count_offset = kind_offset + 1;
    let items_offset = kind_offset + 2;

    if frame.len() < items_offset {
        error!("MULTI_STRUCT frame too short: {} bytes", frame.len());
        return DecodeResult::dropped();
    }

    let kind = DataKind::from_wire(frame[kind_offset]);
    let count = frame[count_offset];

    let min_len = items_offset + count as usize * 3;
    if frame.len() < min_len {
        error!(
            "MULTI_STRUCT length mismatch: need at least {}, got {}",
            min_len,
            frame.len()
        );
        return DecodeResult::dropped();
    }

    for i in 0..count as usize {
        let item_offset = items_offset + i * 3;
        if frame[item_offset] != my_id {
            continue;
        }

        let raw = read_i16_be(frame, item_offset + 1);
        let value = dequantize(raw, kind.scale(scales));

        debug!(
            "MULTI_STRUCT item {} of {}: raw={}, value={}",
            i, count, raw, value
        );

        return DecodeResult {
            command: Some(MotorCommand {
                device_id: my_id,
                kind,
                raw,
                value,
            }),
            response: Some(ack_response(my_id, "MULTI_STRUCT", value)),
            struct_count: Some(count),
        };
    }

    debug!(
        "device {} not among the {} MULTI_STRUCT items",
        my_id, count
    );
    DecodeResult::dropped()
}

fn read_i16_be(frame: &[u8], offset: usize) -> i16 {
    ((frame[offset] as u16) << 8 | frame[offset + 1] as u16) as i16
}

fn ack_response(my_id: u8, tag: &str, value: f32) -> ResponseString {
    let mut s = ResponseString::new();
    // Capacity covers the worst case of every tag; see tests.
    let _ = write!(s, "{}:{}:{:.2}", my_id, tag, value);
    s
}

fn error_response(my_id: u8) -> ResponseString {
    let mut s = ResponseString::new();
    let _ = write!(s, "{}:ERROR:UNKNOWN_PACKET", my_id);
    s
}
