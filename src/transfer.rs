//! Chunked blob transfer.
//!
//! Blobs larger than one APDU move in portions. Uploads mark each portion
//! with a P1 phase byte (0 first, 1 after that) and finish with a trailer
//! (P1 = 2) carrying a 32-byte integrity tag over the whole blob. Downloads
//! read fixed-size portions at increasing big-endian offsets; the
//! dispatcher enforces that every portion comes back with exactly the
//! requested length, so a drifting card aborts the transfer.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::card::{Auth, TonWallet, WalletCommand};
use crate::constants::phase;
use crate::error::Result;
use crate::keystore::HmacSigner;
use crate::state::AppletState;
use crate::transport::CardTransport;

impl<T: CardTransport, S: HmacSigner> TonWallet<T, S> {
    /// Upload `blob` under `instruction` in portions of at most
    /// `portion_size`, then send the trailer carrying `tag`. Returns the
    /// trailer's response payload. An empty blob sends the trailer only.
    pub(crate) fn upload_chunks(
        &mut self,
        current: AppletState,
        instruction: u8,
        blob: &[u8],
        portion_size: usize,
        tag: &[u8],
        trailer_expected: usize,
        auth: Auth,
    ) -> Result<Bytes> {
        debug!(
            ins = format_args!("{instruction:#04x}"),
            len = blob.len(),
            portion_size,
            "uploading blob"
        );

        let mut p1 = phase::FIRST;
        for portion in blob.chunks(portion_size) {
            let cmd = WalletCommand {
                auth,
                ..WalletCommand::plain(instruction, portion.to_vec(), 0)
            }
            .with_p1(p1);
            self.dispatch(current, &cmd)?;
            p1 = phase::NEXT;
        }

        let trailer = WalletCommand {
            auth,
            ..WalletCommand::plain(instruction, tag.to_vec(), trailer_expected)
        }
        .with_p1(phase::TRAILER);
        self.dispatch(current, &trailer)
    }

    /// Download `total` bytes under `cmd_for`, reading portions of at most
    /// `portion_size` at offsets 0, p, 2p, ... A total of zero performs no
    /// card traffic.
    pub(crate) fn download_chunks(
        &mut self,
        current: AppletState,
        total: usize,
        portion_size: usize,
        mut cmd_for: impl FnMut(u16, usize) -> WalletCommand,
    ) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(total);
        let mut offset = 0usize;
        while offset < total {
            let want = portion_size.min(total - offset);
            let portion = self.dispatch(current, &cmd_for(offset as u16, want))?;
            out.put_slice(&portion);
            offset += want;
        }
        debug!(total, "downloaded blob");
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::Command;
    use crate::card::testutil::*;
    use crate::constants::{ins, DATA_RECOVERY_PORTION_MAX_SIZE};

    #[test]
    fn upload_marks_first_next_and_trailer_phases() {
        let blob = vec![0xEE; DATA_RECOVERY_PORTION_MAX_SIZE * 2 + 10];
        let tag = [0x99u8; 32];
        let mut card = card_with([ok(&[]), ok(&[]), ok(&[]), ok(&[])]);
        card.upload_chunks(
            AppletState::Personalized,
            ins::ADD_RECOVERY_DATA_PART,
            &blob,
            DATA_RECOVERY_PORTION_MAX_SIZE,
            &tag,
            0,
            Auth::None,
        )
        .unwrap();

        let phases: Vec<u8> = card.transport().sent.iter().map(|f| f[2]).collect();
        assert_eq!(phases, vec![0x00, 0x01, 0x01, 0x02]);

        let trailer = Command::from_bytes(card.transport().sent.last().unwrap()).unwrap();
        assert_eq!(trailer.data.unwrap().as_ref(), &tag);
    }

    #[test]
    fn empty_blob_sends_only_the_trailer() {
        let tag = [0x11u8; 32];
        let mut card = card_with([ok(&[])]);
        card.upload_chunks(
            AppletState::Personalized,
            ins::ADD_RECOVERY_DATA_PART,
            &[],
            DATA_RECOVERY_PORTION_MAX_SIZE,
            &tag,
            0,
            Auth::None,
        )
        .unwrap();
        assert_eq!(card.transport().sent.len(), 1);
        assert_eq!(card.transport().sent[0][2], 0x02);
    }

    #[test]
    fn download_of_zero_bytes_touches_nothing() {
        let mut card = card_with(Vec::new());
        let blob = card
            .download_chunks(AppletState::Personalized, 0, 128, |offset, want| {
                WalletCommand::plain(
                    ins::GET_RECOVERY_DATA_PART,
                    offset.to_be_bytes().to_vec(),
                    want,
                )
            })
            .unwrap();
        assert!(blob.is_empty());
        assert!(card.transport().sent.is_empty());
    }

    #[test]
    fn download_aborts_when_a_portion_length_drifts() {
        // Second portion comes back one byte short.
        let mut card = card_with([ok(&[0xAA; 128]), ok(&[0xBB; 127])]);
        let err = card
            .download_chunks(AppletState::Personalized, 256, 128, |offset, want| {
                WalletCommand::plain(
                    ins::GET_RECOVERY_DATA_PART,
                    offset.to_be_bytes().to_vec(),
                    want,
                )
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::ResponseLength {
                got: 127,
                want: 128,
                ..
            }
        ));
    }
}
