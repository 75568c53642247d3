//! TON Wallet applet client and command dispatch.
//!
//! [`TonWallet`] owns a transport and an [`HmacSigner`] and funnels every
//! applet command through one dispatch path: state gate, optional
//! challenge-response authentication, encode, transceive, decode, classify.
//! Public operations take a fresh state snapshot at their entry point;
//! nothing about the card is cached between operations except the serial
//! number read at connect time.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::apdu::{Command, Response};
use crate::constants::{
    ins, HMAC_SIZE, SALT_SIZE, SERIAL_NUMBER_SIZE, WALLET_APPLET_AID, WALLET_APPLET_CLA,
};
use crate::error::{Error, Result};
use crate::keystore::HmacSigner;
use crate::state::{self, AppletState};
use crate::transport::CardTransport;
use crate::validation::ValidationError;

/// Whether a command carries a salt and an HMAC tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    /// Sent as-is.
    None,
    /// The payload is extended with a fresh salt and the signer's tag.
    Signed,
}

/// One applet command ready for dispatch.
#[derive(Debug, Clone)]
pub(crate) struct WalletCommand {
    pub(crate) ins: u8,
    pub(crate) p1: u8,
    pub(crate) p2: u8,
    /// Authenticated part of the data field, before salt and tag.
    pub(crate) payload: Bytes,
    /// Exact response payload length the instruction defines.
    pub(crate) expected: usize,
    pub(crate) auth: Auth,
}

impl WalletCommand {
    pub(crate) fn plain(instruction: u8, payload: impl Into<Bytes>, expected: usize) -> Self {
        Self {
            ins: instruction,
            p1: 0,
            p2: 0,
            payload: payload.into(),
            expected,
            auth: Auth::None,
        }
    }

    pub(crate) fn signed(instruction: u8, payload: impl Into<Bytes>, expected: usize) -> Self {
        Self {
            auth: Auth::Signed,
            ..Self::plain(instruction, payload, expected)
        }
    }

    pub(crate) const fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }
}

/// Client for one TON Wallet applet session.
#[derive(Debug)]
pub struct TonWallet<T, S> {
    transport: T,
    signer: S,
    serial: Option<String>,
}

impl<T: CardTransport, S: HmacSigner> TonWallet<T, S> {
    /// Create a client over `transport` signing with `signer`. No card
    /// traffic happens until [`connect`](Self::connect).
    pub const fn new(transport: T, signer: S) -> Self {
        Self {
            transport,
            signer,
            serial: None,
        }
    }

    /// Borrow the underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Borrow the signer.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// Mutably borrow the signer.
    pub fn signer_mut(&mut self) -> &mut S {
        &mut self.signer
    }

    /// The serial number read from the card at connect time.
    pub fn bound_serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Open the transport, select the applet and read the card's serial
    /// number.
    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()?;
        self.select_applet()?;
        let serial = self.serial_number()?;
        if !self.signer.has_key(&serial) {
            warn!(serial = %serial, "no root key bound to this card");
        }
        debug!(serial = %serial, "connected to wallet applet");
        Ok(())
    }

    /// Close the transport. The serial binding is dropped with the session.
    pub fn disconnect(&mut self) -> Result<()> {
        self.serial = None;
        self.transport.disconnect()?;
        Ok(())
    }

    /// Query the applet's current lifecycle state. Always answered, never
    /// cached.
    pub fn applet_state(&mut self) -> Result<AppletState> {
        let payload = self.transmit(
            &Command::new_with_le(WALLET_APPLET_CLA, ins::GET_APP_INFO, 0x00, 0x00, 1),
            1,
        )?;
        let current = AppletState::from_code(payload[0])?;
        trace!(state = %current, "applet state");
        Ok(current)
    }

    /// Read the card's 24-digit serial number and bind it to this session.
    pub fn serial_number(&mut self) -> Result<String> {
        let payload = self.transmit(
            &Command::new_with_le(
                WALLET_APPLET_CLA,
                ins::GET_SERIAL_NUMBER,
                0x00,
                0x00,
                SERIAL_NUMBER_SIZE as u8,
            ),
            SERIAL_NUMBER_SIZE,
        )?;
        let serial = std::str::from_utf8(&payload)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .ok_or(Error::Validation(ValidationError::NotNumeric {
                field: "serial number",
            }))?
            .to_owned();
        self.serial = Some(serial.clone());
        Ok(serial)
    }

    fn select_applet(&mut self) -> Result<()> {
        let select = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, WALLET_APPLET_AID.to_vec());
        self.transmit_variable(&select)?;
        Ok(())
    }

    /// Send one applet command. Refuses a disallowed instruction before any
    /// transport traffic; for a signed command a fresh salt is fetched and
    /// the data field becomes `payload ++ salt ++ tag`.
    pub(crate) fn dispatch(&mut self, current: AppletState, cmd: &WalletCommand) -> Result<Bytes> {
        state::check_allowed(cmd.ins, current)?;

        let data = match cmd.auth {
            Auth::None => cmd.payload.clone(),
            Auth::Signed => self.sign_payload(current, &cmd.payload)?,
        };

        let mut apdu = Command::new(WALLET_APPLET_CLA, cmd.ins, cmd.p1, cmd.p2);
        if !data.is_empty() {
            apdu.data = Some(data);
        }
        if cmd.expected > 0 {
            apdu.le = Some(cmd.expected as u8);
        }
        self.transmit(&apdu, cmd.expected)
    }

    /// Fetch a fresh 32-byte salt. Each signed command calls this exactly
    /// once, so a salt is never reused across round trips.
    fn fetch_salt(&mut self, current: AppletState) -> Result<Bytes> {
        self.dispatch(
            current,
            &WalletCommand::plain(ins::GET_SAULT, Bytes::new(), SALT_SIZE),
        )
    }

    fn sign_payload(&mut self, current: AppletState, payload: &[u8]) -> Result<Bytes> {
        let salt = self.fetch_salt(current)?;
        let serial = self.serial.clone().ok_or(Error::SerialNotBound)?;

        let mut buf = BytesMut::with_capacity(payload.len() + SALT_SIZE + HMAC_SIZE);
        buf.put_slice(payload);
        buf.put_slice(&salt);
        let tag = self.signer.sign(&serial, &buf)?;
        buf.put_slice(&tag);
        Ok(buf.freeze())
    }

    /// Lowest-level exchange: encode, transceive, decode, check the status
    /// word. A refusal keeps the full command frame for diagnostics. Used
    /// directly where the protocol does not fix the payload length.
    pub(crate) fn transmit_variable(&mut self, apdu: &Command) -> Result<Bytes> {
        let frame = apdu.to_bytes();
        trace!(command = %hex::encode(&frame), "transmitting");
        let raw = self.transport.transceive(&frame)?;
        trace!(response = %hex::encode(&raw), "received");

        let response = Response::from_bytes(&raw)?;
        if !response.is_success() {
            warn!(
                ins = format_args!("{:#04x}", apdu.ins),
                status = %response.status,
                "card refused command"
            );
            return Err(Error::Card {
                ins: apdu.ins,
                status: response.status,
                command: hex::encode(&frame),
            });
        }
        Ok(response.payload)
    }

    /// Exchange with the exact payload length the instruction defines. The
    /// classification order is truncation, then status word, then length.
    fn transmit(&mut self, apdu: &Command, expected: usize) -> Result<Bytes> {
        let payload = self.transmit_variable(apdu)?;
        if payload.len() != expected {
            return Err(Error::ResponseLength {
                ins: apdu.ins,
                got: payload.len(),
                want: expected,
            });
        }
        Ok(payload)
    }
}

/// Big-endian u16 from the first two bytes of a length-checked payload.
pub(crate) fn be16(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}
