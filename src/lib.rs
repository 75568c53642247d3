//! Client for the TON Wallet smartcard applet.
//!
//! The applet keeps Ed25519 keys, a keychain of opaque user keys and an
//! encrypted recovery blob on a smartcard. This crate builds the applet's
//! ISO 7816-4 command set, authenticates state-changing commands with an
//! HMAC-SHA256 challenge-response scheme keyed by the card's serial
//! number, gates every command on the applet's lifecycle state, streams
//! large blobs in chunks and can resume a key deletion that a torn session
//! left half-done.
//!
//! The two seams are [`CardTransport`] (raw APDU exchange, implemented by
//! NFC or PC/SC bindings outside this crate) and [`HmacSigner`] (holds the
//! per-card root key; [`SoftwareKeyStore`] is the in-memory
//! implementation).
//!
//! ```ignore
//! use tonwallet_client::{SoftwareKeyStore, TonWallet};
//!
//! let mut keys = SoftwareKeyStore::new();
//! keys.insert_key("504394802433901126813236", [0x42; 32]);
//!
//! let mut card = TonWallet::new(open_transport(), keys);
//! card.connect()?;
//! card.verify_pin("5555")?;
//! let signature = card.sign_for_default_hd_path(b"message")?;
//! ```

pub mod apdu;
pub mod card;
pub mod constants;
pub mod error;
pub mod keystore;
pub mod state;
pub mod transport;
pub mod validation;

mod coinmanager;
mod keychain;
mod recovery;
mod signing;
mod transfer;

pub use card::TonWallet;
pub use error::{Error, Result};
pub use keystore::{HmacSigner, SoftwareKeyStore};
pub use state::AppletState;
pub use transport::{CardTransport, TransportError};
pub use validation::ValidationError;
