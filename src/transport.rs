//! Card transport abstraction.
//!
//! The client is transport-agnostic: anything that can open a session with
//! the card and exchange raw APDU frames can drive it. Hardware bindings
//! (NFC readers, PC/SC) implement [`CardTransport`] outside this crate.

use std::fmt;

use bytes::Bytes;

/// Errors a card transport can report.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host has no usable NFC hardware.
    #[error("NFC hardware is not available")]
    NfcUnavailable,

    /// NFC is present but switched off.
    #[error("NFC is disabled")]
    NfcDisabled,

    /// No card is in the field.
    #[error("no card in the field")]
    NoTag,

    /// `connect` was called on an already connected transport.
    #[error("transport is already connected")]
    AlreadyConnected,

    /// An exchange was attempted without an open session.
    #[error("transport is not connected")]
    NotConnected,

    /// The exchange with the card failed mid-flight.
    #[error("card exchange failed: {0}")]
    Exchange(String),
}

/// A bidirectional raw APDU channel to a single card.
pub trait CardTransport: fmt::Debug + Send {
    /// Open a session with the card. Fails fast if one is already open.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Send one raw APDU frame and return the raw response, including the
    /// trailing status word.
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Close the session.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod replay {
    //! Scripted transport double: a queue of canned responses consumed in
    //! order, plus a log of every frame sent.

    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::{CardTransport, TransportError};

    #[derive(Debug, Default)]
    pub(crate) struct ReplayTransport {
        responses: VecDeque<Bytes>,
        pub(crate) sent: Vec<Bytes>,
        connected: bool,
    }

    impl ReplayTransport {
        pub(crate) fn new<I>(responses: I) -> Self
        where
            I: IntoIterator<Item = Vec<u8>>,
        {
            Self {
                responses: responses.into_iter().map(Bytes::from).collect(),
                sent: Vec::new(),
                connected: false,
            }
        }

        /// A success response carrying `payload`.
        pub(crate) fn ok(payload: &[u8]) -> Vec<u8> {
            let mut raw = payload.to_vec();
            raw.extend_from_slice(&[0x90, 0x00]);
            raw
        }

        /// A bare status-word response.
        pub(crate) fn status(sw1: u8, sw2: u8) -> Vec<u8> {
            vec![sw1, sw2]
        }

        pub(crate) fn remaining(&self) -> usize {
            self.responses.len()
        }
    }

    impl CardTransport for ReplayTransport {
        fn connect(&mut self) -> Result<(), TransportError> {
            if self.connected {
                return Err(TransportError::AlreadyConnected);
            }
            self.connected = true;
            Ok(())
        }

        fn transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
            self.sent.push(Bytes::copy_from_slice(command));
            self.responses
                .pop_front()
                .ok_or_else(|| TransportError::Exchange("replay script exhausted".into()))
        }

        fn disconnect(&mut self) -> Result<(), TransportError> {
            self.connected = false;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn replays_in_order_and_logs_sent_frames() {
            let mut transport = ReplayTransport::new([
                ReplayTransport::ok(&[0x17]),
                ReplayTransport::status(0x6A, 0x82),
            ]);
            assert_eq!(
                transport.transceive(&[0xB0, 0xC1, 0x00, 0x00]).unwrap().as_ref(),
                &[0x17, 0x90, 0x00]
            );
            assert_eq!(
                transport.transceive(&[0xB0, 0xC2, 0x00, 0x00]).unwrap().as_ref(),
                &[0x6A, 0x82]
            );
            assert!(transport.transceive(&[0xB0, 0xC1, 0x00, 0x00]).is_err());
            assert_eq!(transport.sent.len(), 3);
        }

        #[test]
        fn double_connect_fails_fast() {
            let mut transport = ReplayTransport::new([]);
            transport.connect().unwrap();
            assert!(matches!(
                transport.connect(),
                Err(TransportError::AlreadyConnected)
            ));
            transport.disconnect().unwrap();
            transport.connect().unwrap();
        }
    }
}
