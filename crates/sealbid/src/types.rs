//! value types shared across the crate
//!
//! - `Wei`: 256-bit unsigned amount in the smallest token unit
//! - `Address`: 20-byte account / contract address
//! - `Secret`: 32-byte bid secret, zeroized on drop
//! - `Commitment`, `ProposalHash`: 32-byte keccak digests

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// decimals of the native token (ether-style fixed point)
pub const TOKEN_DECIMALS: u32 = 18;

/// encode bytes as `0x`-prefixed lowercase hex
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// decode hex with or without `0x` prefix
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| Error::Validation(format!("invalid hex: {}", e)))
}

/// decode hex into a fixed-size array
pub fn parse_hex_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = parse_hex(s)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::Validation(format!("expected {} bytes, got {}", N, len)))
}

// === Wei ===

/// unsigned 256-bit amount in wei
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(BigUint);

impl Wei {
    /// largest representable bit length
    pub const BITS: u64 = 256;

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(BigUint::from(value))
    }

    /// wrap a big integer, rejecting anything wider than 256 bits
    pub fn from_biguint(value: BigUint) -> Result<Self> {
        if value.bits() > Self::BITS {
            return Err(Error::Validation(format!(
                "amount exceeds 256 bits ({} bits)",
                value.bits()
            )));
        }
        Ok(Self(value))
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// fixed-width 32-byte big-endian encoding (abi `uint256`)
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        // bit length is capped at 256 by every constructor
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// parse a base-10 integer string of wei
    pub fn from_dec_str(s: &str) -> Result<Self> {
        let value = BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| Error::Validation(format!("invalid integer amount: {:?}", s)))?;
        Self::from_biguint(value)
    }

    /// scale a whole-token decimal to wei (`value * 10^18`)
    ///
    /// digits beyond 18 decimals are truncated, negative values are rejected.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(Error::Validation(format!("amount must not be negative: {}", value)));
        }

        let mantissa = BigUint::from(value.mantissa().unsigned_abs());
        let scale = value.scale();
        let ten = BigUint::from(10u32);

        let wei = if scale <= TOKEN_DECIMALS {
            mantissa * ten.pow(TOKEN_DECIMALS - scale)
        } else {
            mantissa / ten.pow(scale - TOKEN_DECIMALS)
        };

        Self::from_biguint(wei)
    }

    /// parse a whole-token decimal string such as `"0.5"`
    pub fn parse_ether(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| Error::Validation(format!("invalid decimal amount {:?}: {}", s, e)))?;
        Self::from_decimal(value)
    }

    /// convert back to whole-token units
    ///
    /// fails for amounts beyond the decimal mantissa (~7.9e10 tokens).
    pub fn to_decimal(&self) -> Result<Decimal> {
        let raw = self
            .0
            .to_i128()
            .ok_or_else(|| Error::Validation("amount too large for decimal".into()))?;
        Decimal::try_from_i128_with_scale(raw, TOKEN_DECIMALS)
            .map(|d| d.normalize())
            .map_err(|e| Error::Validation(e.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_dec_str(s)
    }
}

impl From<u128> for Wei {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Wei::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

// === Address ===

/// 20-byte address, compared byte-wise (so case-insensitively as text)
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// lowercase `0x` form, used in storage keys
    pub fn to_lower_hex(&self) -> String {
        to_hex_prefixed(&self.0)
    }

    /// left-padded 32-byte abi word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lower_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_lower_hex())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex_array::<20>(s).map(Address)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_lower_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// === Secret ===

/// 32-byte bid secret
///
/// never leaves the device until reveal. the debug impl is redacted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; 32]);

impl Secret {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// parse from a byte slice, enforcing the 32-byte length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Validation(format!("secret must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = parse_hex(s)?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex_prefixed(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Secret::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// === digests ===

macro_rules! digest_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                to_hex_prefixed(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                parse_hex_array::<32>(s).map($name)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

digest_type!(
    /// keccak256(amount ‖ secret)
    Commitment
);

digest_type!(
    /// keccak256 of the proposal text
    ProposalHash
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ether() {
        let half = Wei::parse_ether("0.5").unwrap();
        assert_eq!(half, Wei::from_u128(500_000_000_000_000_000));

        let one = Wei::parse_ether("1").unwrap();
        assert_eq!(one.to_string(), "1000000000000000000");
        assert_eq!(one.to_decimal().unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_negative_rejected() {
        let result = Wei::parse_ether("-0.1");
        assert!(matches!(result, Err(Error::Validation(_))));
        // negative zero is just zero
        assert!(Wei::from_decimal(Decimal::NEGATIVE_ONE * Decimal::ZERO).unwrap().is_zero());
    }

    #[test]
    fn test_be_bytes_fixed_width() {
        let bytes = Wei::from_u128(0x0102).to_be_bytes();
        assert_eq!(bytes[30], 0x01);
        assert_eq!(bytes[31], 0x02);
        assert!(bytes[..30].iter().all(|b| *b == 0));

        let max = [0xffu8; 32];
        assert_eq!(Wei::from_be_bytes(&max).to_be_bytes(), max);
        assert_eq!(Wei::zero().to_be_bytes(), [0u8; 32]);
    }

    #[test]
    fn test_rejects_wider_than_256_bits() {
        let too_big = BigUint::from(1u32) << 256usize;
        assert!(Wei::from_biguint(too_big).is_err());
    }

    #[test]
    fn test_address_case_insensitive() {
        let lower: Address = "0xabcdef0123456789abcdef0123456789abcdef01".parse().unwrap();
        let upper: Address = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.to_string(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_secret_length_enforced() {
        assert!(Secret::from_slice(&[1u8; 31]).is_err());
        assert!(Secret::from_slice(&[1u8; 33]).is_err());
        let secret = Secret::from_slice(&[7u8; 32]).unwrap();
        assert_eq!(Secret::from_hex(&secret.to_hex()).unwrap(), secret);
        assert_eq!(format!("{:?}", secret), "Secret(<redacted>)");
    }
}
