//! Device identity and the device record value type.
//!
//! A [`DeviceAddress`] is the 48-bit hardware address a device advertises with.
//! It is the only key the registry uses. A [`DeviceRecord`] is a snapshot of the
//! latest known state of one device.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Regex for a colon or dash separated 48-bit address (`AA:BB:CC:DD:EE:FF`).
static ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2})[:-]([0-9A-Fa-f]{2})[:-]([0-9A-Fa-f]{2})[:-]([0-9A-Fa-f]{2})[:-]([0-9A-Fa-f]{2})[:-]([0-9A-Fa-f]{2})$")
        .expect("address regex is valid")
});

/// Largest value a 48-bit address can hold.
pub const MAX_ADDRESS: u64 = (1 << 48) - 1;

/// Placeholder rendered for devices that never advertised a name.
pub const UNNAMED_PLACEHOLDER: &str = "<unnamed>";

/// Returns `true` if `address` is a well-formed `XX:XX:XX:XX:XX:XX` address.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_REGEX.is_match(address)
}

/// A 48-bit Bluetooth hardware address.
///
/// Stored as a `u64` with the upper 16 bits clear. Displays as upper-case,
/// colon separated hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(u64);

impl DeviceAddress {
    /// Creates an address from its numeric form.
    ///
    /// Returns `None` if the value does not fit in 48 bits.
    #[must_use]
    pub const fn new(raw: u64) -> Option<Self> {
        if raw > MAX_ADDRESS {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Creates an address from six bytes, most significant first.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(
            bytes
                .iter()
                .fold(0_u64, |acc, byte| (acc << 8) | u64::from(*byte)),
        )
    }

    /// The numeric form of the address.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The six address bytes, most significant first.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 6] {
        let be = self.0.to_be_bytes();
        [be[2], be[3], be[4], be[5], be[6], be[7]]
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Error returned when a string is not a valid device address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid device address '{0}'. Expected format XX:XX:XX:XX:XX:XX")]
pub struct ParseAddressError(pub String);

impl FromStr for DeviceAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ADDRESS_REGEX
            .captures(s.trim())
            .ok_or_else(|| ParseAddressError(s.to_string()))?;

        let mut bytes = [0_u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&caps[i + 1], 16)
                .map_err(|_| ParseAddressError(s.to_string()))?;
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Latest known state of one device.
///
/// `name` is empty when the device has never advertised one. The optional
/// flags are `None` when no source has reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Registry key.
    pub address: DeviceAddress,

    /// Display name, empty when unnamed.
    pub name: String,

    /// Signal strength of the latest sighting in dBm.
    pub rssi: i16,

    /// When the latest advertisement was received.
    pub last_seen: Instant,

    /// Whether the device currently holds a connection.
    pub connected: Option<bool>,

    /// Whether the device accepts pairing.
    pub pairable: Option<bool>,

    /// Whether the device is bonded with this host.
    pub paired: Option<bool>,

    /// Platform-issued identifier, kept as an attribute only.
    pub platform_id: Option<String>,
}

impl DeviceRecord {
    /// Creates a record with no optional flags.
    pub fn new(address: DeviceAddress, name: impl Into<String>, rssi: i16, last_seen: Instant) -> Self {
        Self {
            address,
            name: name.into(),
            rssi,
            last_seen,
            connected: None,
            pairable: None,
            paired: None,
            platform_id: None,
        }
    }

    /// Whether the device has a non-empty name.
    #[must_use]
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// The name, or `None` when unnamed.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.is_named().then_some(self.name.as_str())
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} dBm",
            self.name().unwrap_or(UNNAMED_PLACEHOLDER),
            self.address,
            self.rssi
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_address() {
        let addr: DeviceAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(addr.as_u64(), 0xAABB_CCDD_EEFF);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");

        let dashed: DeviceAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(dashed, addr);
    }

    #[test]
    fn test_invalid_addresses_rejected() {
        assert!("AA:BB:CC:DD:EE".parse::<DeviceAddress>().is_err());
        assert!("GG:BB:CC:DD:EE:FF".parse::<DeviceAddress>().is_err());
        assert!("".parse::<DeviceAddress>().is_err());
        assert!(!is_valid_address("AABBCCDDEEFF"));
        assert!(is_valid_address("00:11:22:33:44:55"));
    }

    #[test]
    fn test_new_rejects_values_above_48_bits() {
        assert!(DeviceAddress::new(MAX_ADDRESS).is_some());
        assert!(DeviceAddress::new(MAX_ADDRESS + 1).is_none());
    }

    #[test]
    fn test_bytes_are_most_significant_first() {
        let addr = DeviceAddress::from_bytes([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(addr.as_u64(), 0x0102_0304_0506);
        assert_eq!(addr.to_bytes(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_address_serializes_as_string() {
        let addr = DeviceAddress::new(0x00_1A_7D_DA_71_13).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"00:1A:7D:DA:71:13\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_record_display_uses_placeholder_when_unnamed() {
        let addr = DeviceAddress::new(0xAABB_CCDD_EEFF).unwrap();
        let unnamed = DeviceRecord::new(addr, "", -70, Instant::now());
        assert_eq!(unnamed.to_string(), "<unnamed> (AA:BB:CC:DD:EE:FF) -70 dBm");
        assert!(unnamed.name().is_none());

        let named = DeviceRecord::new(addr, "Heart Rate", -48, Instant::now());
        assert_eq!(named.to_string(), "Heart Rate (AA:BB:CC:DD:EE:FF) -48 dBm");
    }
}
