//! Keychain storage and the multi-phase delete controller.
//!
//! The keychain stores opaque keys addressed by their HMAC-SHA256 tag
//! under the card's root key. Adding and changing a key stream the bytes
//! in 128-byte portions with the tag as trailer; deletion runs on-card in
//! bounded steps so a torn session can be resumed after the applet reports
//! the deleting state.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::card::{be16, Auth, TonWallet, WalletCommand};
use crate::constants::{ins, DATA_PORTION_MAX_SIZE, HMAC_SIZE, MAX_NUMBER_OF_KEYS};
use crate::error::{Error, Result};
use crate::keystore::HmacSigner;
use crate::state::AppletState;
use crate::transport::CardTransport;
use crate::validation::{self, ValidationError};

impl<T: CardTransport, S: HmacSigner> TonWallet<T, S> {
    /// Number of keys currently stored in the keychain.
    pub fn get_number_of_keys(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        self.number_of_keys_in(current)
    }

    /// Free keychain capacity in bytes.
    pub fn get_free_storage_size(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        self.signed_u16_query(current, ins::GET_FREE_STORAGE_SIZE)
    }

    /// Occupied keychain capacity in bytes.
    pub fn get_occupied_storage_size(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        self.signed_u16_query(current, ins::GET_OCCUPIED_STORAGE_SIZE)
    }

    /// Record index and key length for the key with the given HMAC tag.
    pub fn get_key_index_and_len(&mut self, key_hmac: &[u8; HMAC_SIZE]) -> Result<(u16, u16)> {
        let current = self.applet_state()?;
        self.locate_in(current, key_hmac)
    }

    /// HMAC tag and key length of the record at `index`.
    pub fn get_hmac(&mut self, index: u16) -> Result<([u8; HMAC_SIZE], u16)> {
        let current = self.applet_state()?;
        let payload = self.dispatch(
            current,
            &WalletCommand::signed(ins::GET_HMAC, index.to_be_bytes().to_vec(), HMAC_SIZE + 2),
        )?;
        let mut tag = [0u8; HMAC_SIZE];
        tag.copy_from_slice(&payload[..HMAC_SIZE]);
        Ok((tag, be16(&payload[HMAC_SIZE..])))
    }

    /// Ask the card to re-verify the stored tag for the given key.
    pub fn check_key_hmac_consistency(&mut self, key_hmac: &[u8; HMAC_SIZE]) -> Result<()> {
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::signed(ins::CHECK_KEY_HMAC_CONSISTENCY, key_hmac.to_vec(), 0),
        )?;
        Ok(())
    }

    /// Ask the card whether a key of `size` bytes would fit.
    pub fn check_available_vol_for_new_key(&mut self, size: u16) -> Result<()> {
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::signed(
                ins::CHECK_AVAILABLE_VOL_FOR_NEW_KEY,
                size.to_be_bytes().to_vec(),
                0,
            ),
        )?;
        Ok(())
    }

    /// Erase every keychain record.
    pub fn reset_keychain(&mut self) -> Result<()> {
        let current = self.applet_state()?;
        self.dispatch(
            current,
            &WalletCommand::signed(ins::RESET_KEYCHAIN, Bytes::new(), 0),
        )?;
        debug!("keychain reset");
        Ok(())
    }

    /// Store a new key and return its HMAC tag. The card's key count must
    /// land exactly one above its value before the add.
    pub fn add_key(&mut self, key: &[u8]) -> Result<[u8; HMAC_SIZE]> {
        validation::keychain_key(key)?;
        let current = self.applet_state()?;
        let before = self.number_of_keys_in(current)?;
        self.dispatch(
            current,
            &WalletCommand::signed(
                ins::CHECK_AVAILABLE_VOL_FOR_NEW_KEY,
                (key.len() as u16).to_be_bytes().to_vec(),
                0,
            ),
        )?;

        let tag = self.tag_for(key)?;
        let count = self.upload_chunks(
            current,
            ins::ADD_KEY_CHUNK,
            key,
            DATA_PORTION_MAX_SIZE,
            &tag,
            2,
            Auth::Signed,
        )?;
        let after = be16(&count);
        if after != before + 1 {
            return Err(Error::KeyCountMismatch {
                want: before + 1,
                got: after,
            });
        }
        debug!(len = key.len(), count = after, "key added to keychain");
        Ok(tag)
    }

    /// Replace the key identified by `old_key_hmac` with `new_key` of the
    /// same length. Returns the new key's HMAC tag.
    pub fn change_key(
        &mut self,
        new_key: &[u8],
        old_key_hmac: &[u8; HMAC_SIZE],
    ) -> Result<[u8; HMAC_SIZE]> {
        validation::keychain_key(new_key)?;
        let current = self.applet_state()?;
        let (index, len) = self.locate_in(current, old_key_hmac)?;
        if new_key.len() != len as usize {
            return Err(Error::Validation(ValidationError::IncorrectLength {
                field: "replacement key",
                expected: len as usize,
                actual: new_key.len(),
            }));
        }
        self.dispatch(
            current,
            &WalletCommand::signed(ins::INITIATE_CHANGE_OF_KEY, index.to_be_bytes().to_vec(), 0),
        )?;

        let tag = self.tag_for(new_key)?;
        self.upload_chunks(
            current,
            ins::CHANGE_KEY_CHUNK,
            new_key,
            DATA_PORTION_MAX_SIZE,
            &tag,
            0,
            Auth::Signed,
        )?;
        debug!(index, "key replaced in keychain");
        Ok(tag)
    }

    /// Read back the key with the given HMAC tag.
    pub fn get_key(&mut self, key_hmac: &[u8; HMAC_SIZE]) -> Result<Bytes> {
        let current = self.applet_state()?;
        let (index, len) = self.locate_in(current, key_hmac)?;
        self.download_chunks(current, len as usize, DATA_PORTION_MAX_SIZE, |offset, want| {
            let mut payload = Vec::with_capacity(4);
            payload.extend_from_slice(&index.to_be_bytes());
            payload.extend_from_slice(&offset.to_be_bytes());
            WalletCommand::signed(ins::GET_KEY_CHUNK, payload, want)
        })
    }

    /// Delete the key with the given HMAC tag and return the key count
    /// afterwards. The card performs the deletion in bounded steps; if the
    /// session is torn mid-way, [`finish_delete_key_after_interruption`]
    /// picks the work back up.
    ///
    /// [`finish_delete_key_after_interruption`]: Self::finish_delete_key_after_interruption
    pub fn delete_key(&mut self, key_hmac: &[u8; HMAC_SIZE]) -> Result<u16> {
        let current = self.applet_state()?;
        let (index, _) = self.locate_in(current, key_hmac)?;
        self.dispatch(
            current,
            &WalletCommand::signed(ins::INITIATE_DELETE_KEY, index.to_be_bytes().to_vec(), 0),
        )?;
        // The applet is in the deleting state from here until both loops
        // have drained.
        let current = self.applet_state()?;
        self.run_delete_phases(current)
    }

    /// Finish a key deletion that a previous session left half-done. Only
    /// valid when a fresh state query reports the deleting state.
    pub fn finish_delete_key_after_interruption(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        if current != AppletState::DeletingKey {
            return Err(Error::StateNotAllowed {
                ins: ins::DELETE_KEY_CHUNK,
                current,
                allowed: &[AppletState::DeletingKey],
            });
        }
        warn!("resuming interrupted key deletion");
        self.run_delete_phases(current)
    }

    /// Remaining chunk packets of the deletion in progress.
    pub fn get_delete_key_chunk_counter(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        self.signed_u16_query(current, ins::GET_DELETE_KEY_CHUNK_NUM_OF_PACKETS)
    }

    /// Remaining record packets of the deletion in progress.
    pub fn get_delete_key_record_counter(&mut self) -> Result<u16> {
        let current = self.applet_state()?;
        self.signed_u16_query(current, ins::GET_DELETE_KEY_RECORD_NUM_OF_PACKETS)
    }

    /// Drive both delete loops until the card reports each done, then read
    /// the key count back as verification.
    fn run_delete_phases(&mut self, current: AppletState) -> Result<u16> {
        for instruction in [ins::DELETE_KEY_CHUNK, ins::DELETE_KEY_RECORD] {
            loop {
                let flag =
                    self.dispatch(current, &WalletCommand::signed(instruction, Bytes::new(), 1))?;
                if flag[0] != 0 {
                    break;
                }
            }
        }
        debug!("key deletion finished");
        let current = self.applet_state()?;
        self.number_of_keys_in(current)
    }

    fn number_of_keys_in(&mut self, current: AppletState) -> Result<u16> {
        let count = self.signed_u16_query(current, ins::GET_NUMBER_OF_KEYS)?;
        // A hostile count must never reach the drift arithmetic.
        if count as usize > MAX_NUMBER_OF_KEYS {
            return Err(Error::KeyCountOutOfRange {
                got: count,
                max: MAX_NUMBER_OF_KEYS as u16,
            });
        }
        Ok(count)
    }

    fn locate_in(
        &mut self,
        current: AppletState,
        key_hmac: &[u8; HMAC_SIZE],
    ) -> Result<(u16, u16)> {
        let payload = self.dispatch(
            current,
            &WalletCommand::signed(ins::GET_KEY_INDEX_IN_STORAGE_AND_LEN, key_hmac.to_vec(), 4),
        )?;
        Ok((be16(&payload[..2]), be16(&payload[2..])))
    }

    fn signed_u16_query(&mut self, current: AppletState, instruction: u8) -> Result<u16> {
        let payload = self.dispatch(current, &WalletCommand::signed(instruction, Bytes::new(), 2))?;
        Ok(be16(&payload))
    }

    fn tag_for(&self, key: &[u8]) -> Result<[u8; HMAC_SIZE]> {
        let serial = self.bound_serial().ok_or(Error::SerialNotBound)?;
        self.signer().sign(serial, key)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::apdu::Command;
    use crate::card::testutil::*;
    use crate::constants::SALT_SIZE;

    const KEY_ID: [u8; 32] =
        hex!("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");

    fn frames_with_ins(card_sent: &[Bytes], instruction: u8) -> Vec<Command> {
        card_sent
            .iter()
            .filter(|f| f[1] == instruction)
            .map(|f| Command::from_bytes(f).unwrap())
            .collect()
    }

    #[test]
    fn add_key_streams_chunks_and_checks_the_count() {
        let key = vec![0x7C; 300];
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&2u16.to_be_bytes()), // count before
            salt_ok(),
            ok(&[]), // volume check
            salt_ok(),
            ok(&[]), // chunk 1
            salt_ok(),
            ok(&[]), // chunk 2
            salt_ok(),
            ok(&[]), // chunk 3
            salt_ok(),
            ok(&3u16.to_be_bytes()), // trailer: new count
        ]);
        let tag = card.add_key(&key).unwrap();
        assert_eq!(tag, expected_tag(&key));

        let chunks = frames_with_ins(&card.transport().sent, ins::ADD_KEY_CHUNK);
        assert_eq!(chunks.len(), 4);
        assert_eq!(
            chunks.iter().map(|c| c.p1).collect::<Vec<_>>(),
            vec![0x00, 0x01, 0x01, 0x02]
        );
        // Portions are 128, 128, 44 bytes plus salt and tag each.
        let chunk_payload_len = |c: &Command| c.data.as_ref().unwrap().len() - SALT_SIZE - HMAC_SIZE;
        assert_eq!(chunk_payload_len(&chunks[0]), 128);
        assert_eq!(chunk_payload_len(&chunks[2]), 44);
        // Trailer carries the key's tag.
        assert_eq!(&chunks[3].data.as_ref().unwrap()[..HMAC_SIZE], &tag);
    }

    #[test]
    fn add_key_detects_count_drift() {
        let key = vec![0x7C; 10];
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&2u16.to_be_bytes()),
            salt_ok(),
            ok(&[]),
            salt_ok(),
            ok(&[]),
            salt_ok(),
            ok(&2u16.to_be_bytes()), // count did not move
        ]);
        assert!(matches!(
            card.add_key(&key).unwrap_err(),
            Error::KeyCountMismatch { want: 3, got: 2 }
        ));
    }

    #[test]
    fn count_above_capacity_is_a_typed_error() {
        // A well-formed 2-byte answer of 0xFFFF is out of range, not a
        // value the drift check may do arithmetic on.
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&0xFFFFu16.to_be_bytes()),
        ]);
        let err = card.add_key(&[0x7C; 10]).unwrap_err();
        assert!(matches!(
            err,
            Error::KeyCountOutOfRange { got: 0xFFFF, max: 1023 }
        ));

        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&1024u16.to_be_bytes()),
        ]);
        assert!(matches!(
            card.get_number_of_keys().unwrap_err(),
            Error::KeyCountOutOfRange { got: 1024, .. }
        ));
    }

    #[test]
    fn get_key_reads_550_bytes_in_five_chunks() {
        let key: Vec<u8> = (0..550u16).map(|i| (i % 251) as u8).collect();
        let mut responses = vec![
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&hex!("0003 0226")), // index 3, length 550
        ];
        for part in key.chunks(DATA_PORTION_MAX_SIZE) {
            responses.push(salt_ok());
            responses.push(ok(part));
        }
        let mut card = card_with(responses);
        let read = card.get_key(&KEY_ID).unwrap();
        assert_eq!(read.as_ref(), &key[..]);

        let chunks = frames_with_ins(&card.transport().sent, ins::GET_KEY_CHUNK);
        assert_eq!(chunks.len(), 5);
        let offsets: Vec<u16> = chunks
            .iter()
            .map(|c| be16(&c.data.as_ref().unwrap()[2..4]))
            .collect();
        assert_eq!(offsets, vec![0, 128, 256, 384, 512]);
        let wants: Vec<u8> = chunks.iter().map(|c| c.le.unwrap()).collect();
        assert_eq!(wants, vec![128, 128, 128, 128, 38]);
        // Every chunk query addresses record 3.
        assert!(chunks
            .iter()
            .all(|c| be16(&c.data.as_ref().unwrap()[..2]) == 3));
    }

    #[test]
    fn delete_key_drains_chunk_then_record_loops() {
        let mut responses = vec![
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&hex!("0001 0040")), // locate: index 1, length 64
            salt_ok(),
            ok(&[]), // initiate
            state_ok(AppletState::DeletingKey),
        ];
        for flag in [0u8, 0, 0, 1] {
            responses.push(salt_ok());
            responses.push(ok(&[flag]));
        }
        for flag in [0u8, 0, 1] {
            responses.push(salt_ok());
            responses.push(ok(&[flag]));
        }
        responses.push(state_ok(AppletState::Personalized));
        responses.push(salt_ok());
        responses.push(ok(&1u16.to_be_bytes()));

        let mut card = card_with(responses);
        let count = card.delete_key(&KEY_ID).unwrap();
        assert_eq!(count, 1);
        assert_eq!(card.transport().remaining(), 0);

        let sent = &card.transport().sent;
        assert_eq!(
            frames_with_ins(sent, ins::DELETE_KEY_CHUNK).len(),
            4,
            "chunk loop runs until the done flag"
        );
        assert_eq!(frames_with_ins(sent, ins::DELETE_KEY_RECORD).len(), 3);
    }

    #[test]
    fn resume_requires_the_deleting_state() {
        let mut card = card_with([state_ok(AppletState::Personalized)]);
        let err = card.finish_delete_key_after_interruption().unwrap_err();
        assert!(matches!(
            err,
            Error::StateNotAllowed {
                current: AppletState::Personalized,
                ..
            }
        ));
        assert_eq!(card.transport().sent.len(), 1);
    }

    #[test]
    fn resume_skips_locate_and_initiate() {
        let mut card = card_with([
            state_ok(AppletState::DeletingKey),
            salt_ok(),
            ok(&[0x01]), // chunk loop already done
            salt_ok(),
            ok(&[0x01]), // record loop already done
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&0u16.to_be_bytes()),
        ]);
        let count = card.finish_delete_key_after_interruption().unwrap();
        assert_eq!(count, 0);

        let sent = &card.transport().sent;
        assert!(frames_with_ins(sent, ins::GET_KEY_INDEX_IN_STORAGE_AND_LEN).is_empty());
        assert!(frames_with_ins(sent, ins::INITIATE_DELETE_KEY).is_empty());
    }

    #[test]
    fn inventory_queries_decode_big_endian_counters() {
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&hex!("0102")),
        ]);
        assert_eq!(card.get_free_storage_size().unwrap(), 0x0102);

        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&hex!("7FFF")),
        ]);
        assert_eq!(card.get_occupied_storage_size().unwrap(), 32767);

        let mut card = card_with([
            state_ok(AppletState::DeletingKey),
            salt_ok(),
            ok(&hex!("000A")),
        ]);
        assert_eq!(card.get_delete_key_chunk_counter().unwrap(), 10);
    }

    #[test]
    fn get_hmac_splits_tag_and_length() {
        let mut payload = KEY_ID.to_vec();
        payload.extend_from_slice(&hex!("0226"));
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&payload),
        ]);
        let (tag, len) = card.get_hmac(7).unwrap();
        assert_eq!(tag, KEY_ID);
        assert_eq!(len, 550);

        let frame = Command::from_bytes(&card.transport().sent[2]).unwrap();
        assert_eq!(&frame.data.unwrap()[..2], &hex!("0007"));
    }

    #[test]
    fn change_key_requires_matching_length() {
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&hex!("0001 0040")), // old key is 64 bytes
        ]);
        let err = card.change_key(&[0u8; 10], &KEY_ID).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::IncorrectLength {
                expected: 64,
                actual: 10,
                ..
            })
        ));
        assert!(frames_with_ins(&card.transport().sent, ins::INITIATE_CHANGE_OF_KEY).is_empty());
    }

    #[test]
    fn change_key_initiates_then_streams_the_replacement() {
        let new_key = vec![0x3D; 64];
        let mut card = card_with([
            state_ok(AppletState::Personalized),
            salt_ok(),
            ok(&hex!("0001 0040")),
            salt_ok(),
            ok(&[]), // initiate change
            salt_ok(),
            ok(&[]), // single chunk
            salt_ok(),
            ok(&[]), // trailer
        ]);
        let tag = card.change_key(&new_key, &KEY_ID).unwrap();
        assert_eq!(tag, expected_tag(&new_key));

        let initiate = frames_with_ins(&card.transport().sent, ins::INITIATE_CHANGE_OF_KEY);
        assert_eq!(be16(&initiate[0].data.as_ref().unwrap()[..2]), 1);
        let chunks = frames_with_ins(&card.transport().sent, ins::CHANGE_KEY_CHUNK);
        assert_eq!(
            chunks.iter().map(|c| c.p1).collect::<Vec<_>>(),
            vec![0x00, 0x02]
        );
    }
}
