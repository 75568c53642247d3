//! PIN verification, public keys and Ed25519 signing.
//!
//! Messages are signed on-card along HD paths of the form
//! `m/44'/396'/0'/0'/i'`; the default-path forms use index 0. The message
//! itself travels with a 2-byte big-endian length prefix; the explicit-path
//! forms append the decimal index digits behind a 1-byte length.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::card::{TonWallet, WalletCommand};
use crate::constants::{ins, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::Result;
use crate::keystore::HmacSigner;
use crate::state::AppletState;
use crate::transport::CardTransport;
use crate::validation;

impl<T: CardTransport, S: HmacSigner> TonWallet<T, S> {
    /// Present the 4-digit PIN to the card.
    pub fn verify_pin(&mut self, pin: &str) -> Result<()> {
        let pin = validation::pin_bytes(pin)?;
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::signed(ins::VERIFY_PIN, pin.to_vec(), 0),
        )?;
        debug!("PIN accepted");
        Ok(())
    }

    /// Public key for the HD path with the given decimal index.
    pub fn get_public_key(&mut self, hd_index: &str) -> Result<Bytes> {
        let index = validation::hd_index_bytes(hd_index)?;
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::plain(ins::GET_PUBLIC_KEY, index, PUBLIC_KEY_SIZE),
        )
    }

    /// Public key for the default HD path.
    pub fn get_public_key_for_default_path(&mut self) -> Result<Bytes> {
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::plain(
                ins::GET_PUBLIC_KEY_WITH_DEFAULT_HD_PATH,
                Bytes::new(),
                PUBLIC_KEY_SIZE,
            ),
        )
    }

    /// Sign `data` along the default HD path.
    pub fn sign_for_default_hd_path(&mut self, data: &[u8]) -> Result<Bytes> {
        validation::signing_data(data)?;
        let current = self.applet_state()?;
        self.sign_in(current, data, None)
    }

    /// Sign `data` along the HD path with the given decimal index.
    pub fn sign(&mut self, data: &[u8], hd_index: &str) -> Result<Bytes> {
        validation::signing_data_with_path(data)?;
        let index = validation::hd_index_bytes(hd_index)?;
        let current = self.applet_state()?;
        self.sign_in(current, data, Some(&index))
    }

    /// Verify the PIN and sign in one operation. Both commands fetch their
    /// own fresh salt.
    pub fn verify_pin_and_sign_for_default_hd_path(
        &mut self,
        data: &[u8],
        pin: &str,
    ) -> Result<Bytes> {
        let pin = validation::pin_bytes(pin)?;
        validation::signing_data(data)?;
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::signed(ins::VERIFY_PIN, pin.to_vec(), 0),
        )?;
        self.sign_in(current, data, None)
    }

    /// Verify the PIN and sign along an explicit HD path in one operation.
    pub fn verify_pin_and_sign(&mut self, data: &[u8], hd_index: &str, pin: &str) -> Result<Bytes> {
        let pin = validation::pin_bytes(pin)?;
        validation::signing_data_with_path(data)?;
        let index = validation::hd_index_bytes(hd_index)?;
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::signed(ins::VERIFY_PIN, pin.to_vec(), 0),
        )?;
        self.sign_in(current, data, Some(&index))
    }

    fn sign_in(
        &mut self,
        current: AppletState,
        data: &[u8],
        hd_index: Option<&Bytes>,
    ) -> Result<Bytes> {
        let mut payload = BytesMut::with_capacity(2 + data.len() + 1 + 10);
        payload.put_u16(data.len() as u16);
        payload.put_slice(data);

        let instruction = match hd_index {
            Some(index) => {
                payload.put_u8(index.len() as u8);
                payload.put_slice(index);
                ins::SIGN_SHORT_MESSAGE
            }
            None => ins::SIGN_SHORT_MESSAGE_WITH_DEFAULT_PATH,
        };

        let signature = self.dispatch(
            current,
            &WalletCommand::signed(instruction, payload.freeze(), SIGNATURE_SIZE),
        )?;
        debug!(len = data.len(), "message signed on card");
        Ok(signature)
    }
}
