//! Microbit GATT constants and characteristic payload helpers
//!
//! The BLE transport itself lives outside this crate. These helpers are for
//! the external BLE bridge that feeds `NOTIFY` lines to the listener: device
//! matching against the `[device]` config, client event writes and
//! characteristic text decoding. They cover the byte-level contract with the
//! Microbit event service:
//! - event characteristic notifications carry (type: u16 LE, value: u16 LE)
//! - client events written back use the same 4-byte layout
//! - string characteristics are UTF-8 and may contain garbage bytes

use uuid::Uuid;

/// Microbit event service
pub const EVENT_SERVICE: Uuid = Uuid::from_u128(0xe95d93af_251d_470a_a062_fa1922dfa9a8);

/// Notifications from the Microbit (MicroBit Event characteristic)
pub const EVENT_CHARACTERISTIC: Uuid = Uuid::from_u128(0xe95d9775_251d_470a_a062_fa1922dfa9a8);

/// Events written to the Microbit (Client Event characteristic)
pub const CLIENT_EVENT_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0xe95d5404_251d_470a_a062_fa1922dfa9a8);

/// Event types the client wants to be notified about
pub const CLIENT_REQUIREMENTS_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0xe95d23c4_251d_470a_a062_fa1922dfa9a8);

/// Client Characteristic Configuration Descriptor (enables notifications)
pub const NOTIFICATION_DESCRIPTOR: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Event type used by the app for client events
pub const CLIENT_EVENT_TYPE: u16 = 0x22B8;

/// Default advertised-name fragments identifying a Microbit
pub const DEFAULT_NAME_FILTERS: [&str; 2] = ["MicroBit", "micro:bit"];

/// Check whether an advertised device name belongs to a Microbit
pub fn is_microbit<S: AsRef<str>>(name: Option<&str>, filters: &[S]) -> bool {
    match name {
        Some(name) => filters.iter().any(|f| name.contains(f.as_ref())),
        None => false,
    }
}

/// Build a client event payload: event type then value, both u16 little-endian
pub fn encode_client_event(event_type: u16, value: u16) -> [u8; 4] {
    let t = event_type.to_le_bytes();
    let v = value.to_le_bytes();
    [t[0], t[1], v[0], v[1]]
}

/// Decode a string characteristic value.
///
/// Handles 1-3 byte UTF-8 sequences. Bytes that cannot start a sequence
/// (stray continuation bytes, 4-byte leads) and truncated sequences are
/// rendered as `[<byte>]` so the rest of the value stays readable.
pub fn decode_characteristic_text(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let c = data[i];
        i += 1;

        let code_point = match c >> 4 {
            0..=7 => Some(u32::from(c)),
            12 | 13 if i < data.len() => {
                let c2 = data[i];
                i += 1;
                Some((u32::from(c & 0x1F) << 6) | u32::from(c2 & 0x3F))
            }
            14 if i + 1 < data.len() => {
                let (c2, c3) = (data[i], data[i + 1]);
                i += 2;
                Some(
                    (u32::from(c & 0x0F) << 12)
                        | (u32::from(c2 & 0x3F) << 6)
                        | u32::from(c3 & 0x3F),
                )
            }
            _ => None,
        };

        match code_point {
            Some(cp) => out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER)),
            None => {
                out.push('[');
                out.push_str(&c.to_string());
                out.push(']');
            }
        }
    }

    out
}
