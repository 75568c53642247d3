//! Input validation for user-supplied protocol fields.
//!
//! Everything here runs before a single byte leaves the host, so a bad
//! input never costs a card round trip.

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::constants::{
    DATA_FOR_SIGNING_MAX_SIZE, DATA_FOR_SIGNING_MAX_SIZE_WITH_PATH, MAX_HD_INDEX_SIZE,
    MAX_KEY_SIZE_IN_KEYCHAIN, PIN_SIZE, RECOVERY_DATA_MAX_SIZE,
};

/// A rejected input.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The field does not have its mandated length.
    #[error("{field} must be {expected} bytes, got {actual}")]
    IncorrectLength {
        /// Field name.
        field: &'static str,
        /// Mandated length.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// The field must consist of decimal digits only.
    #[error("{field} must contain only decimal digits")]
    NotNumeric {
        /// Field name.
        field: &'static str,
    },

    /// The field is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },

    /// The field exceeds its upper bound.
    #[error("{field} is {actual} bytes, maximum is {max}")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Length actually supplied.
        actual: usize,
        /// Upper bound.
        max: usize,
    },
}

fn require_digits(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::NotNumeric { field })
    }
}

/// Encode a PIN string as the ASCII digit bytes the applet expects. The
/// default PIN "5555" becomes `35 35 35 35`.
pub fn pin_bytes(pin: &str) -> Result<Zeroizing<[u8; PIN_SIZE]>, ValidationError> {
    if pin.len() != PIN_SIZE {
        return Err(ValidationError::IncorrectLength {
            field: "PIN",
            expected: PIN_SIZE,
            actual: pin.len(),
        });
    }
    require_digits(pin, "PIN")?;
    let mut out = Zeroizing::new([0u8; PIN_SIZE]);
    out.copy_from_slice(pin.as_bytes());
    Ok(out)
}

/// Encode an HD index as the ASCII digit bytes the applet expects.
pub fn hd_index_bytes(index: &str) -> Result<Bytes, ValidationError> {
    if index.is_empty() {
        return Err(ValidationError::Empty { field: "HD index" });
    }
    if index.len() > MAX_HD_INDEX_SIZE {
        return Err(ValidationError::TooLong {
            field: "HD index",
            actual: index.len(),
            max: MAX_HD_INDEX_SIZE,
        });
    }
    require_digits(index, "HD index")?;
    Ok(Bytes::copy_from_slice(index.as_bytes()))
}

fn bounded(data: &[u8], field: &'static str, max: usize) -> Result<(), ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if data.len() > max {
        return Err(ValidationError::TooLong {
            field,
            actual: data.len(),
            max,
        });
    }
    Ok(())
}

/// Bounds for a message signed along the default HD path.
pub fn signing_data(data: &[u8]) -> Result<(), ValidationError> {
    bounded(data, "data for signing", DATA_FOR_SIGNING_MAX_SIZE)
}

/// Bounds for a message signed along an explicit HD path.
pub fn signing_data_with_path(data: &[u8]) -> Result<(), ValidationError> {
    bounded(data, "data for signing", DATA_FOR_SIGNING_MAX_SIZE_WITH_PATH)
}

/// Bounds for a recovery-data blob.
pub fn recovery_data(data: &[u8]) -> Result<(), ValidationError> {
    bounded(data, "recovery data", RECOVERY_DATA_MAX_SIZE)
}

/// Bounds for a keychain key.
pub fn keychain_key(key: &[u8]) -> Result<(), ValidationError> {
    bounded(key, "keychain key", MAX_KEY_SIZE_IN_KEYCHAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pin_encodes_to_ascii_digits() {
        let pin = pin_bytes("5555").unwrap();
        assert_eq!(*pin, [0x35, 0x35, 0x35, 0x35]);
    }

    #[test]
    fn pin_must_be_four_decimal_digits() {
        assert_eq!(
            pin_bytes("55555").unwrap_err(),
            ValidationError::IncorrectLength {
                field: "PIN",
                expected: 4,
                actual: 5
            }
        );
        assert_eq!(
            pin_bytes("55a5").unwrap_err(),
            ValidationError::NotNumeric { field: "PIN" }
        );
        assert!(pin_bytes("0000").is_ok());
    }

    #[test]
    fn hd_index_bounds() {
        assert_eq!(hd_index_bytes("1").unwrap().as_ref(), b"1");
        assert_eq!(hd_index_bytes("1234567890").unwrap().as_ref(), b"1234567890");
        assert!(hd_index_bytes("").is_err());
        assert!(hd_index_bytes("12345678901").is_err());
        assert!(hd_index_bytes("12x").is_err());
    }

    #[test]
    fn blob_bounds() {
        assert!(signing_data(&[0u8; 189]).is_ok());
        assert!(signing_data(&[0u8; 190]).is_err());
        assert!(signing_data_with_path(&[0u8; 178]).is_ok());
        assert!(signing_data_with_path(&[0u8; 179]).is_err());
        assert!(recovery_data(&[0u8; 2048]).is_ok());
        assert!(recovery_data(&[0u8; 2049]).is_err());
        assert!(recovery_data(&[]).is_err());
        assert!(keychain_key(&[0u8; 8192]).is_ok());
        assert!(keychain_key(&[0u8; 8193]).is_err());
    }
}
