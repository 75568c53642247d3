//! CoinManager commands for card-level management.
//!
//! The CoinManager is a separate applet that owns the card itself: PIN try
//! counters, the device label, seed generation and the factory reset. Its
//! commands share one envelope (`CLA 0x80, INS 0xCB, P1 0x80, P2 0x00`)
//! and select the operation with a tag prefix in the data field. They are
//! not HMAC-authenticated and the wallet applet's lifecycle state does not
//! apply to them, so they bypass the dispatch gate entirely.

use bytes::Bytes;
use tracing::debug;

use crate::apdu::Command;
use crate::card::TonWallet;
use crate::constants::{DEVICE_LABEL_SIZE, PIN_SIZE};
use crate::error::{Error, Result};
use crate::keystore::HmacSigner;
use crate::transport::CardTransport;
use crate::validation;

const COIN_MANAGER_CLA: u8 = 0x80;
const COIN_MANAGER_INS: u8 = 0xCB;
const COIN_MANAGER_P1: u8 = 0x80;
const COIN_MANAGER_P2: u8 = 0x00;

const GET_PIN_RTL: &[u8] = &[0xDF, 0xFF, 0x02, 0x81, 0x02];
const GET_PIN_TLT: &[u8] = &[0xDF, 0xFF, 0x02, 0x81, 0x03];
const GET_CSN: &[u8] = &[0xDF, 0xFF, 0x02, 0x81, 0x01];
const GET_DEVICE_LABEL: &[u8] = &[0xDF, 0xFF, 0x02, 0x81, 0x04];
const GET_SE_VERSION: &[u8] = &[0xDF, 0xFF, 0x02, 0x81, 0x09];
const GET_AVAILABLE_MEMORY: &[u8] = &[0xDF, 0xFE, 0x02, 0x81, 0x46];
const RESET_WALLET: &[u8] = &[0xDF, 0xFE, 0x02, 0x82, 0x05];
const SET_DEVICE_LABEL_PREFIX: &[u8] = &[0xDF, 0xFE, 0x23, 0x81, 0x04, 0x20];
const CHANGE_PIN_PREFIX: &[u8] = &[0xDF, 0xFE, 0x0D, 0x82, 0x04, 0x0A];
const GENERATE_SEED_PREFIX: &[u8] = &[0xDF, 0xFE, 0x08, 0x82, 0x03, 0x05];

impl<T: CardTransport, S: HmacSigner> TonWallet<T, S> {
    /// Remaining PIN tries before the wallet applet blocks.
    pub fn get_remaining_pin_tries(&mut self) -> Result<u8> {
        let payload = self.coin_manager(GET_PIN_RTL.to_vec())?;
        Self::last_byte(&payload)
    }

    /// Maximum number of PIN tries the card grants.
    pub fn get_pin_try_limit(&mut self) -> Result<u8> {
        let payload = self.coin_manager(GET_PIN_TLT.to_vec())?;
        Self::last_byte(&payload)
    }

    /// Card serial number as the CoinManager reports it (CSN).
    pub fn get_csn(&mut self) -> Result<Bytes> {
        self.coin_manager(GET_CSN.to_vec())
    }

    /// Version of the secure element firmware.
    pub fn get_se_version(&mut self) -> Result<Bytes> {
        self.coin_manager(GET_SE_VERSION.to_vec())
    }

    /// Remaining persistent memory on the card.
    pub fn get_available_memory(&mut self) -> Result<Bytes> {
        self.coin_manager(GET_AVAILABLE_MEMORY.to_vec())
    }

    /// The 32-byte device label.
    pub fn get_device_label(&mut self) -> Result<Bytes> {
        let payload = self.coin_manager(GET_DEVICE_LABEL.to_vec())?;
        if payload.len() != DEVICE_LABEL_SIZE {
            return Err(Error::ResponseLength {
                ins: COIN_MANAGER_INS,
                got: payload.len(),
                want: DEVICE_LABEL_SIZE,
            });
        }
        Ok(payload)
    }

    /// Overwrite the 32-byte device label.
    pub fn set_device_label(&mut self, label: &[u8; DEVICE_LABEL_SIZE]) -> Result<()> {
        let mut data = SET_DEVICE_LABEL_PREFIX.to_vec();
        data.extend_from_slice(label);
        self.coin_manager(data)?;
        debug!("device label set");
        Ok(())
    }

    /// Change the PIN. Both PINs travel as ASCII digits behind a 1-byte
    /// length.
    pub fn change_pin(&mut self, old_pin: &str, new_pin: &str) -> Result<()> {
        let old_pin = validation::pin_bytes(old_pin)?;
        let new_pin = validation::pin_bytes(new_pin)?;
        let mut data = CHANGE_PIN_PREFIX.to_vec();
        data.push(PIN_SIZE as u8);
        data.extend_from_slice(old_pin.as_ref());
        data.push(PIN_SIZE as u8);
        data.extend_from_slice(new_pin.as_ref());
        self.coin_manager(data)?;
        debug!("PIN changed");
        Ok(())
    }

    /// Generate the master seed under the given PIN. Refused by the card if
    /// a seed already exists.
    pub fn generate_seed(&mut self, pin: &str) -> Result<()> {
        let pin = validation::pin_bytes(pin)?;
        let mut data = GENERATE_SEED_PREFIX.to_vec();
        data.push(PIN_SIZE as u8);
        data.extend_from_slice(pin.as_ref());
        self.coin_manager(data)?;
        debug!("master seed generated");
        Ok(())
    }

    /// Factory-reset the wallet: erases the seed and returns the applet to
    /// its blank installed state.
    pub fn reset_wallet(&mut self) -> Result<()> {
        self.coin_manager(RESET_WALLET.to_vec())?;
        debug!("wallet reset");
        Ok(())
    }

    fn coin_manager(&mut self, data: Vec<u8>) -> Result<Bytes> {
        let apdu = Command::new_with_data(
            COIN_MANAGER_CLA,
            COIN_MANAGER_INS,
            COIN_MANAGER_P1,
            COIN_MANAGER_P2,
            data,
        );
        self.transmit_variable(&apdu)
    }

    fn last_byte(payload: &Bytes) -> Result<u8> {
        payload.last().copied().ok_or(Error::ResponseLength {
            ins: COIN_MANAGER_INS,
            got: 0,
            want: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::StatusWord;
    use crate::card::testutil::*;

    #[test]
    fn pin_counters_read_the_last_byte() {
        let mut card = card_with([ok(&[0xDF, 0xFF, 0x00, 0x03]), ok(&[0x0A])]);
        assert_eq!(card.get_remaining_pin_tries().unwrap(), 3);
        assert_eq!(card.get_pin_try_limit().unwrap(), 10);

        // No state query happens first: the envelope goes out directly.
        let sent = &card.transport().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[0][..4], &[0x80, 0xCB, 0x80, 0x00]);
        assert_eq!(&sent[0][5..10], GET_PIN_RTL);
        assert_eq!(&sent[1][5..10], GET_PIN_TLT);
    }

    #[test]
    fn empty_counter_response_is_an_error() {
        let mut card = card_with([ok(&[])]);
        assert!(matches!(
            card.get_remaining_pin_tries().unwrap_err(),
            Error::ResponseLength { got: 0, want: 1, .. }
        ));
    }

    #[test]
    fn device_label_must_be_exactly_32_bytes() {
        let mut card = card_with([ok(&[0x4C; 32])]);
        assert_eq!(card.get_device_label().unwrap().as_ref(), &[0x4C; 32]);

        let mut card = card_with([ok(&[0x4C; 31])]);
        assert!(matches!(
            card.get_device_label().unwrap_err(),
            Error::ResponseLength { got: 31, want: 32, .. }
        ));
    }

    #[test]
    fn set_device_label_wraps_the_label_behind_its_tag() {
        let mut card = card_with([ok(&[])]);
        card.set_device_label(&[0x4C; 32]).unwrap();

        let frame = &card.transport().sent[0];
        assert_eq!(&frame[5..11], SET_DEVICE_LABEL_PREFIX);
        assert_eq!(&frame[11..43], &[0x4C; 32]);
    }

    #[test]
    fn change_pin_sends_both_pins_with_length_bytes() {
        let mut card = card_with([ok(&[])]);
        card.change_pin("5555", "6666").unwrap();

        let frame = &card.transport().sent[0];
        let data = &frame[5..];
        assert_eq!(&data[..6], CHANGE_PIN_PREFIX);
        assert_eq!(data[6], 4);
        assert_eq!(&data[7..11], &[0x35; 4]);
        assert_eq!(data[11], 4);
        assert_eq!(&data[12..16], &[0x36; 4]);
    }

    #[test]
    fn malformed_pin_is_refused_before_any_traffic() {
        let mut card = card_with(Vec::new());
        assert!(card.change_pin("555", "6666").is_err());
        assert!(card.generate_seed("66x6").is_err());
        assert!(card.transport().sent.is_empty());
    }

    #[test]
    fn generate_seed_and_reset_use_their_tags() {
        let mut card = card_with([ok(&[]), ok(&[])]);
        card.generate_seed("5555").unwrap();
        card.reset_wallet().unwrap();

        let sent = &card.transport().sent;
        assert_eq!(&sent[0][5..11], GENERATE_SEED_PREFIX);
        assert_eq!(sent[0][11], 4);
        assert_eq!(&sent[0][12..16], &[0x35; 4]);
        assert_eq!(&sent[1][5..10], RESET_WALLET);
    }

    #[test]
    fn refusal_carries_the_envelope_frame() {
        let mut card = card_with([status(0x6D, 0x00)]);
        let err = card.get_csn().unwrap_err();
        match err {
            Error::Card { ins, status, command } => {
                assert_eq!(ins, 0xCB);
                assert_eq!(status, StatusWord::from_u16(0x6D00));
                assert_eq!(command, hex::encode(&card.transport().sent[0]));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
