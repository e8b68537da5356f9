//! Batch encryption for Bedrock links: AES-256 in CTR mode, with an
//! 8-byte SHA-256 checksum appended to each batch before encryption.

use aes::Aes256;
use anyhow::bail;
use ctr::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};
use std::fmt;

type Aes256Ctr = ctr::Ctr32BE<Aes256>;

const CHECKSUM_LENGTH: usize = 8;

/// Key used for encryption, as derived by the key exchange.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The counter block starts from the first 12 key bytes
    /// followed by a big-endian counter of 2.
    fn iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..12].copy_from_slice(&self.0[..12]);
        iv[15] = 2;
        iv
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Cipher state for one link. Each direction keeps its own
/// keystream position and checksum counter.
pub struct EncryptionState {
    key: EncryptionKey,
    encryptor: Aes256Ctr,
    decryptor: Aes256Ctr,
    send_counter: u64,
    receive_counter: u64,
}

impl EncryptionState {
    pub fn new(key: EncryptionKey) -> Self {
        let iv = key.iv();
        let cipher = || {
            Aes256Ctr::new(
                GenericArray::from_slice(key.as_bytes()),
                GenericArray::from_slice(&iv),
            )
        };
        Self {
            key,
            encryptor: cipher(),
            decryptor: cipher(),
            send_counter: 0,
            receive_counter: 0,
        }
    }

    /// Appends the checksum and encrypts `payload` in place.
    pub fn encrypt(&mut self, payload: &mut Vec<u8>) {
        let checksum = checksum(self.send_counter, payload, &self.key);
        self.send_counter = self.send_counter.wrapping_add(1);
        payload.extend_from_slice(&checksum);
        self.encryptor.apply_keystream(payload);
    }

    /// Decrypts `data` in place, verifies and strips the checksum.
    pub fn decrypt(&mut self, data: &mut Vec<u8>) -> anyhow::Result<()> {
        self.decryptor.apply_keystream(data);
        if data.len() < CHECKSUM_LENGTH {
            bail!("encrypted batch too short to carry a checksum");
        }
        let split = data.len() - CHECKSUM_LENGTH;
        let expected = checksum(self.receive_counter, &data[..split], &self.key);
        if expected[..] != data[split..] {
            bail!("batch checksum mismatch");
        }
        self.receive_counter = self.receive_counter.wrapping_add(1);
        data.truncate(split);
        Ok(())
    }
}

fn checksum(counter: u64, payload: &[u8], key: &EncryptionKey) -> [u8; CHECKSUM_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(counter.to_le_bytes());
    hasher.update(payload);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut checksum = [0u8; CHECKSUM_LENGTH];
    checksum.copy_from_slice(&digest[..CHECKSUM_LENGTH]);
    checksum
}
