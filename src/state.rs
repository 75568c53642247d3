//! Applet lifecycle states and the per-instruction state gate.
//!
//! The applet answers the universal state query in every state; everything
//! else is accepted only in the states listed here. The client checks the
//! table before a command leaves the host, so a disallowed instruction
//! never reaches the card.

use std::fmt;

use crate::constants::ins;
use crate::error::Error;

/// Lifecycle state of the TON Wallet applet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppletState {
    /// Installed but not yet personalized.
    Installed,
    /// Personalized and fully operational.
    Personalized,
    /// Blocked until the unblock password is presented.
    WaitingAuthorization,
    /// A key deletion is in progress.
    DeletingKey,
    /// Permanently blocked.
    Blocked,
}

impl AppletState {
    /// The state byte the applet reports for this state.
    pub const fn code(self) -> u8 {
        match self {
            Self::Installed => 0x07,
            Self::Personalized => 0x17,
            Self::WaitingAuthorization => 0x27,
            Self::DeletingKey => 0x37,
            Self::Blocked => 0x47,
        }
    }

    /// Decode a state byte reported by the applet.
    pub fn from_code(code: u8) -> Result<Self, Error> {
        match code {
            0x07 => Ok(Self::Installed),
            0x17 => Ok(Self::Personalized),
            0x27 => Ok(Self::WaitingAuthorization),
            0x37 => Ok(Self::DeletingKey),
            0x47 => Ok(Self::Blocked),
            other => Err(Error::UnknownState(other)),
        }
    }

    /// Human-readable description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Installed => "TonWallet applet is installed, personalization has not started",
            Self::Personalized => "TonWallet applet is personalized",
            Self::WaitingAuthorization => "TonWallet applet waits for authorization",
            Self::DeletingKey => "TonWallet applet is deleting a key",
            Self::Blocked => "TonWallet applet is blocked",
        }
    }
}

impl fmt::Display for AppletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

const ALL_STATES: &[AppletState] = &[
    AppletState::Installed,
    AppletState::Personalized,
    AppletState::WaitingAuthorization,
    AppletState::DeletingKey,
    AppletState::Blocked,
];
const INSTALLED: &[AppletState] = &[AppletState::Installed];
const WAITING_AUTHORIZATION: &[AppletState] = &[AppletState::WaitingAuthorization];
const PERSONALIZED: &[AppletState] = &[AppletState::Personalized];
const PERSONALIZED_AND_DELETE: &[AppletState] =
    &[AppletState::Personalized, AppletState::DeletingKey];
const NOWHERE: &[AppletState] = &[];

/// States in which the applet accepts the given instruction. Unknown
/// instructions are accepted nowhere.
pub fn allowed_states(instruction: u8) -> &'static [AppletState] {
    match instruction {
        ins::GET_APP_INFO | ins::GET_SERIAL_NUMBER => ALL_STATES,

        ins::FINISH_PERS
        | ins::SET_ENCRYPTED_PASSWORD
        | ins::SET_ENCRYPTED_COMMON_SECRET
        | ins::SET_SERIAL_NUMBER => INSTALLED,

        ins::VERIFY_PASSWORD
        | ins::GET_HASH_OF_ENCRYPTED_PASSWORD
        | ins::GET_HASH_OF_ENCRYPTED_COMMON_SECRET => WAITING_AUTHORIZATION,

        ins::ADD_KEY_CHUNK
        | ins::CHECK_AVAILABLE_VOL_FOR_NEW_KEY
        | ins::INITIATE_CHANGE_OF_KEY
        | ins::CHANGE_KEY_CHUNK => PERSONALIZED,

        ins::GET_SAULT
        | ins::INITIATE_DELETE_KEY
        | ins::VERIFY_PIN
        | ins::GET_PUBLIC_KEY
        | ins::GET_PUBLIC_KEY_WITH_DEFAULT_HD_PATH
        | ins::SIGN_SHORT_MESSAGE
        | ins::SIGN_SHORT_MESSAGE_WITH_DEFAULT_PATH
        | ins::CHECK_KEY_HMAC_CONSISTENCY
        | ins::GET_KEY_INDEX_IN_STORAGE_AND_LEN
        | ins::GET_KEY_CHUNK
        | ins::GET_NUMBER_OF_KEYS
        | ins::RESET_KEYCHAIN
        | ins::GET_FREE_STORAGE_SIZE
        | ins::GET_OCCUPIED_STORAGE_SIZE
        | ins::GET_HMAC
        | ins::DELETE_KEY_CHUNK
        | ins::DELETE_KEY_RECORD
        | ins::GET_DELETE_KEY_CHUNK_NUM_OF_PACKETS
        | ins::GET_DELETE_KEY_RECORD_NUM_OF_PACKETS
        | ins::ADD_RECOVERY_DATA_PART
        | ins::GET_RECOVERY_DATA_PART
        | ins::GET_RECOVERY_DATA_HASH
        | ins::GET_RECOVERY_DATA_LEN
        | ins::RESET_RECOVERY_DATA
        | ins::IS_RECOVERY_DATA_SET => PERSONALIZED_AND_DELETE,

        _ => NOWHERE,
    }
}

/// Refuse `instruction` unless the applet's current state accepts it.
pub fn check_allowed(instruction: u8, current: AppletState) -> Result<(), Error> {
    let allowed = allowed_states(instruction);
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(Error::StateNotAllowed {
            ins: instruction,
            current,
            allowed,
        })
    }
}
