//! Recovery-data storage.
//!
//! The card keeps one opaque recovery blob (encrypted by the service that
//! wrote it) of at most 2048 bytes. Unlike the keychain, this path is not
//! HMAC-authenticated: integrity comes from the SHA-256 trailer on upload
//! and the stored hash on download.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::card::{be16, Auth, TonWallet, WalletCommand};
use crate::constants::{
    ins, DATA_RECOVERY_PORTION_MAX_SIZE, RECOVERY_DATA_MAX_SIZE, SHA_HASH_SIZE,
};
use crate::error::{Error, Result};
use crate::keystore::HmacSigner;
use crate::state::AppletState;
use crate::transport::CardTransport;
use crate::validation;

impl<T: CardTransport, S: HmacSigner> TonWallet<T, S> {
    /// Write the recovery blob to the card: chunked upload followed by a
    /// SHA-256 trailer over the whole blob.
    pub fn add_recovery_data(&mut self, data: &[u8]) -> Result<()> {
        validation::recovery_data(data)?;
        let current = self.applet_state()?;
        let hash: [u8; SHA_HASH_SIZE] = Sha256::digest(data).into();
        self.upload_chunks(
            current,
            ins::ADD_RECOVERY_DATA_PART,
            data,
            DATA_RECOVERY_PORTION_MAX_SIZE,
            &hash,
            0,
            Auth::None,
        )?;
        debug!(len = data.len(), "recovery data stored");
        Ok(())
    }

    /// Read the whole recovery blob back: length query, then a chunked
    /// download.
    pub fn get_recovery_data(&mut self) -> Result<Bytes> {
        let current = self.applet_state()?;
        let len = self.recovery_data_len_in(current)?;
        self.download_chunks(
            current,
            len as usize,
            DATA_RECOVERY_PORTION_MAX_SIZE,
            |offset, want| {
                WalletCommand::plain(
                    ins::GET_RECOVERY_DATA_PART,
                    offset.to_be_bytes().to_vec(),
                    want,
                )
            },
        )
    }

    /// SHA-256 hash of the stored recovery blob.
    pub fn get_recovery_data_hash(&mut self) -> Result<Bytes> {
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::plain(ins::GET_RECOVERY_DATA_HASH, Bytes::new(), SHA_HASH_SIZE),
        )
    }

    /// Length of the stored recovery blob in bytes.
    pub fn get_recovery_data_len(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        self.recovery_data_len_in(current)
    }

    /// Whether a recovery blob is present.
    pub fn is_recovery_data_set(&mut self) -> Result<bool> {
        let current = self.applet_state()?;
        let flag = self.dispatch(
            current,
            &WalletCommand::plain(ins::IS_RECOVERY_DATA_SET, Bytes::new(), 1),
        )?;
        Ok(flag[0] != 0)
    }

    /// Erase the stored recovery blob.
    pub fn reset_recovery_data(&mut self) -> Result<()> {
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::plain(ins::RESET_RECOVERY_DATA, Bytes::new(), 0),
        )?;
        debug!("recovery data erased");
        Ok(())
    }

    fn recovery_data_len_in(&mut self, current: AppletState) -> Result<u16> {
        let payload = self.dispatch(
            current,
            &WalletCommand::plain(ins::GET_RECOVERY_DATA_LEN, Bytes::new(), 2),
        )?;
        let len = be16(&payload);
        if len as usize > RECOVERY_DATA_MAX_SIZE {
            return Err(Error::ResponseLength {
                ins: ins::GET_RECOVERY_DATA_LEN,
                got: len as usize,
                want: RECOVERY_DATA_MAX_SIZE,
            });
        }
        Ok(len)
    }
}
