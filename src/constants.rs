//! Protocol constants for the TON Wallet applet.

/// Class byte carried by every applet instruction.
pub const WALLET_APPLET_CLA: u8 = 0xB0;

/// AID of the TON Wallet applet instance, selected at connect time.
pub const WALLET_APPLET_AID: [u8; 12] = [
    0x31, 0x31, 0x32, 0x32, 0x33, 0x33, 0x34, 0x34, 0x35, 0x35, 0x36, 0x36,
];

/// PIN length in ASCII digits.
pub const PIN_SIZE: usize = 4;
/// Length of the random challenge (salt) returned by GET_SAULT.
pub const SALT_SIZE: usize = 32;
/// Length of an HMAC-SHA256 tag.
pub const HMAC_SIZE: usize = 32;
/// Length of a SHA-256 digest.
pub const SHA_HASH_SIZE: usize = 32;
/// Length of an Ed25519 signature returned by the sign instructions.
pub const SIGNATURE_SIZE: usize = 64;
/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Length of the card serial number in ASCII digits.
pub const SERIAL_NUMBER_SIZE: usize = 24;
/// Length of a keychain record index or length field.
pub const KEY_INDEX_SIZE: usize = 2;

/// Portion size for keychain key upload and download.
pub const DATA_PORTION_MAX_SIZE: usize = 128;
/// Portion size for recovery-data upload and download.
pub const DATA_RECOVERY_PORTION_MAX_SIZE: usize = 250;
/// Upper bound on the recovery-data blob.
pub const RECOVERY_DATA_MAX_SIZE: usize = 2048;
/// Upper bound on a single keychain key.
pub const MAX_KEY_SIZE_IN_KEYCHAIN: usize = 8192;
/// Total keychain capacity in bytes.
pub const KEY_CHAIN_SIZE: usize = 32767;
/// Upper bound on the number of keychain records.
pub const MAX_NUMBER_OF_KEYS: usize = 1023;

/// Maximum HD index length in decimal digits.
pub const MAX_HD_INDEX_SIZE: usize = 10;
/// Maximum message length for the default-path sign instruction.
pub const DATA_FOR_SIGNING_MAX_SIZE: usize = 189;
/// Maximum message length when an explicit HD index is carried.
pub const DATA_FOR_SIGNING_MAX_SIZE_WITH_PATH: usize = 178;

/// Factory-default PIN.
pub const DEFAULT_PIN: &str = "5555";

/// Length of the CoinManager device label.
pub const DEVICE_LABEL_SIZE: usize = 32;

/// P1 values marking the position of a portion inside a chunked transfer.
pub mod phase {
    /// First portion of a blob.
    pub const FIRST: u8 = 0x00;
    /// Any portion after the first.
    pub const NEXT: u8 = 0x01;
    /// Trailer carrying the integrity tag for the whole blob.
    pub const TRAILER: u8 = 0x02;
}

/// Instruction bytes of the TON Wallet applet.
#[allow(missing_docs)]
pub mod ins {
    // Personalization, only reachable in the Installed state.
    pub const FINISH_PERS: u8 = 0x90;
    pub const SET_ENCRYPTED_PASSWORD: u8 = 0x91;
    pub const VERIFY_PASSWORD: u8 = 0x92;
    pub const GET_HASH_OF_ENCRYPTED_PASSWORD: u8 = 0x93;
    pub const SET_ENCRYPTED_COMMON_SECRET: u8 = 0x94;
    pub const GET_HASH_OF_ENCRYPTED_COMMON_SECRET: u8 = 0x95;
    pub const SET_SERIAL_NUMBER: u8 = 0x96;

    // PIN and signing.
    pub const GET_PUBLIC_KEY: u8 = 0xA0;
    pub const VERIFY_PIN: u8 = 0xA2;
    pub const SIGN_SHORT_MESSAGE: u8 = 0xA3;
    pub const SIGN_SHORT_MESSAGE_WITH_DEFAULT_PATH: u8 = 0xA5;
    pub const GET_PUBLIC_KEY_WITH_DEFAULT_HD_PATH: u8 = 0xA7;

    // Keychain.
    pub const CHECK_KEY_HMAC_CONSISTENCY: u8 = 0xB0;
    pub const GET_KEY_INDEX_IN_STORAGE_AND_LEN: u8 = 0xB1;
    pub const GET_KEY_CHUNK: u8 = 0xB2;
    pub const CHECK_AVAILABLE_VOL_FOR_NEW_KEY: u8 = 0xB3;
    pub const ADD_KEY_CHUNK: u8 = 0xB4;
    pub const INITIATE_CHANGE_OF_KEY: u8 = 0xB5;
    pub const CHANGE_KEY_CHUNK: u8 = 0xB6;
    pub const INITIATE_DELETE_KEY: u8 = 0xB7;
    pub const GET_NUMBER_OF_KEYS: u8 = 0xB8;
    pub const RESET_KEYCHAIN: u8 = 0xB9;
    pub const GET_FREE_STORAGE_SIZE: u8 = 0xBA;
    pub const GET_OCCUPIED_STORAGE_SIZE: u8 = 0xBB;
    pub const GET_HMAC: u8 = 0xBC;
    pub const GET_SAULT: u8 = 0xBD;
    pub const DELETE_KEY_CHUNK: u8 = 0xBE;
    pub const DELETE_KEY_RECORD: u8 = 0xBF;
    pub const GET_DELETE_KEY_CHUNK_NUM_OF_PACKETS: u8 = 0xE1;
    pub const GET_DELETE_KEY_RECORD_NUM_OF_PACKETS: u8 = 0xE2;

    // Universal queries, answered in every state.
    pub const GET_APP_INFO: u8 = 0xC1;
    pub const GET_SERIAL_NUMBER: u8 = 0xC2;

    // Recovery data.
    pub const ADD_RECOVERY_DATA_PART: u8 = 0xD1;
    pub const GET_RECOVERY_DATA_PART: u8 = 0xD2;
    pub const GET_RECOVERY_DATA_HASH: u8 = 0xD3;
    pub const GET_RECOVERY_DATA_LEN: u8 = 0xD4;
    pub const RESET_RECOVERY_DATA: u8 = 0xD5;
    pub const IS_RECOVERY_DATA_SET: u8 = 0xD6;
}
