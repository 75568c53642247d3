//! Root key storage and challenge signing.
//!
//! Every state-changing applet command is authenticated with an
//! HMAC-SHA256 tag computed under a root key bound to the card's serial
//! number. The key itself lives behind the [`HmacSigner`] seam so a
//! platform keystore can hold it without ever exposing key bytes to the
//! protocol layer.

use std::collections::HashMap;
use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::constants::HMAC_SIZE;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs challenge messages under the root key bound to a card serial
/// number.
pub trait HmacSigner: fmt::Debug + Send {
    /// Compute the HMAC-SHA256 tag of `message` under the root key for
    /// `serial`. Fails when no key is bound to that serial number.
    fn sign(&self, serial: &str, message: &[u8]) -> Result<[u8; HMAC_SIZE]>;

    /// Whether a root key is bound to `serial`.
    fn has_key(&self, serial: &str) -> bool;
}

/// In-memory key store. Key bytes are wiped when an entry is dropped.
#[derive(Default)]
pub struct SoftwareKeyStore {
    keys: HashMap<String, Zeroizing<[u8; 32]>>,
}

impl SoftwareKeyStore {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a root key to a serial number, replacing any previous key.
    pub fn insert_key(&mut self, serial: impl Into<String>, key: [u8; 32]) {
        self.keys.insert(serial.into(), Zeroizing::new(key));
    }

    /// Remove the key bound to `serial`, if any.
    pub fn remove_key(&mut self, serial: &str) -> bool {
        self.keys.remove(serial).is_some()
    }
}

impl fmt::Debug for SoftwareKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeyStore")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl HmacSigner for SoftwareKeyStore {
    fn sign(&self, serial: &str, message: &[u8]) -> Result<[u8; HMAC_SIZE]> {
        let key = self
            .keys
            .get(serial)
            .ok_or_else(|| Error::UnknownSerialNumber(serial.to_owned()))?;
        let mut mac =
            HmacSha256::new_from_slice(key.as_slice()).expect("hmac accepts any key length");
        mac.update(message);
        Ok(mac.finalize().into_bytes().into())
    }

    fn has_key(&self, serial: &str) -> bool {
        self.keys.contains_key(serial)
    }
}
