//! Error types for the TON Wallet applet client.

use crate::apdu::StatusWord;
use crate::state::AppletState;
use crate::transport::TransportError;
use crate::validation::ValidationError;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the applet client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An input failed validation before anything was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The card answered with a non-success status word.
    #[error("card returned {status} to instruction {ins:#04x} (command {command})")]
    Card {
        /// Instruction the card objected to.
        ins: u8,
        /// Status word the card returned.
        status: StatusWord,
        /// Hex encoding of the command frame that was sent.
        command: String,
    },

    /// The response payload did not have the length the instruction defines.
    #[error("response to instruction {ins:#04x} was {got} bytes, expected {want}")]
    ResponseLength {
        /// Instruction that was sent.
        ins: u8,
        /// Payload length actually received.
        got: usize,
        /// Payload length the protocol defines.
        want: usize,
    },

    /// The raw response buffer was shorter than a bare status word.
    #[error("response buffer of {got} bytes is too short to carry a status word")]
    TruncatedResponse {
        /// Raw buffer length.
        got: usize,
    },

    /// A raw command buffer could not be parsed.
    #[error("invalid command length {0}")]
    InvalidCommandLength(usize),

    /// The instruction is not allowed in the applet's current state.
    #[error("instruction {ins:#04x} is not allowed in state {current}")]
    StateNotAllowed {
        /// Refused instruction.
        ins: u8,
        /// State the card reported.
        current: AppletState,
        /// States in which the instruction is accepted.
        allowed: &'static [AppletState],
    },

    /// The card reported a state byte outside the known lifecycle.
    #[error("unknown applet state code {0:#04x}")]
    UnknownState(u8),

    /// No root key is stored for the card's serial number.
    #[error("no root key for serial number {0}")]
    UnknownSerialNumber(String),

    /// An authenticated command was attempted before the serial number was
    /// read from the card.
    #[error("card serial number has not been read yet")]
    SerialNotBound,

    /// The key count after an add did not land on the expected value.
    #[error("keychain reported {got} keys, expected {want}")]
    KeyCountMismatch {
        /// Count the keychain should have reached.
        want: u16,
        /// Count the keychain reported.
        got: u16,
    },

    /// The card reported a key count beyond the keychain's capacity.
    #[error("keychain reported {got} keys, capacity is {max}")]
    KeyCountOutOfRange {
        /// Count the card reported.
        got: u16,
        /// Keychain capacity in records.
        max: u16,
    },
}
