//! Envelope encryption primitives.
//!
//! One 32-byte AES-256 data key is generated per segment and never rotated.
//! The data key is wrapped under the configured RSA public key for storage in
//! the manifest, and unwrapped with the private key when a chunk needs to be
//! decrypted. Per-chunk confidentiality uses AES-256-GCM: each chunk gets a
//! fresh random 12-byte IV, which is prepended to the ciphertext, matching
//! the header-nonce layout common to chunked AES-GCM vault formats.

use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand_core::OsRng as RsaOsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const IV_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
pub const DATA_KEY_SIZE: usize = 32;

/// A per-segment symmetric data key. Zeroized on drop.
#[derive(Clone)]
pub struct DataKey(Zeroizing<[u8; DATA_KEY_SIZE]>);

impl DataKey {
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; DATA_KEY_SIZE];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
        Self(Zeroizing::new(bytes))
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; DATA_KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new_from_slice(&self.0[..]).expect("32-byte key is always valid for AES-256-GCM")
    }
}

/// Holds the asymmetric key pair used to wrap/unwrap segment data keys, plus
/// the cipher operations for per-chunk encrypt/decrypt.
#[derive(Clone)]
pub struct EnvelopeCrypto {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
}

impl EnvelopeCrypto {
    /// Construct a crypto context capable of both wrapping and unwrapping
    /// (used by writers, and by readers that also need to generate keys in tests).
    #[must_use]
    pub fn new(public_key: RsaPublicKey, private_key: RsaPrivateKey) -> Self {
        Self {
            public_key,
            private_key: Some(private_key),
        }
    }

    /// Construct a read-only crypto context capable only of unwrapping, built
    /// directly from the private key (the public key is derived from it).
    #[must_use]
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        Self {
            public_key,
            private_key: Some(private_key),
        }
    }

    /// Construct a write-only crypto context capable only of wrapping a data
    /// key, for callers that hold the asymmetric public key but not the
    /// private half (a writer with no need to ever decrypt its own uploads).
    #[must_use]
    pub fn from_public_key(public_key: RsaPublicKey) -> Self {
        Self {
            public_key,
            private_key: None,
        }
    }

    /// Wrap a freshly generated data key under the configured public key.
    pub fn wrap_data_key(&self, data_key: &DataKey) -> Result<Vec<u8>, CryptoError> {
        let padding = Oaep::new::<Sha256>();
        self.public_key
            .encrypt(&mut RsaOsRng, padding, &data_key.0[..])
            .map_err(CryptoError::KeyWrap)
    }

    /// Unwrap a wrapped data key using the private key.
    pub fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<DataKey, CryptoError> {
        let private_key = self
            .private_key
            .as_ref()
            .expect("unwrap requires a private key; construct via `new` or `from_private_key`");
        let padding = Oaep::new::<Sha256>();
        let raw = private_key
            .decrypt(padding, wrapped)
            .map_err(CryptoError::KeyUnwrap)?;
        let bytes: [u8; DATA_KEY_SIZE] = raw
            .try_into()
            .map_err(|_| CryptoError::KeyUnwrap(rsa::Error::Decryption))?;
        Ok(DataKey::from_bytes(bytes))
    }

    /// Encrypt one chunk: generates a random IV, authenticates `aad`, and
    /// returns `IV || ciphertext || tag`.
    pub fn encrypt_chunk(
        &self,
        data_key: &DataKey,
        chunk_ordinal: u32,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = data_key.cipher();
        let nonce = Aes256Gcm::generate_nonce(&mut aes_gcm::aead::OsRng);

        let full_aad = chunk_aad(chunk_ordinal, aad);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &full_aad,
                },
            )
            .map_err(|_| CryptoError::AuthTagInvalid)?;

        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt one chunk previously produced by [`Self::encrypt_chunk`].
    pub fn decrypt_chunk(
        &self,
        data_key: &DataKey,
        chunk_ordinal: u32,
        aad: &[u8],
        transformed: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if transformed.len() < IV_SIZE + TAG_SIZE {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (iv, ciphertext) = transformed.split_at(IV_SIZE);
        let nonce = Nonce::from_slice(iv);
        let cipher = data_key.cipher();
        let full_aad = chunk_aad(chunk_ordinal, aad);

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &full_aad,
                },
            )
            .map_err(|_| CryptoError::AuthTagInvalid)
    }
}

/// Additional authenticated data: the chunk ordinal bound to the segment-level
/// AAD from the manifest, so chunks cannot be reordered or spliced between
/// segments without invalidating the auth tag.
fn chunk_aad(chunk_ordinal: u32, segment_aad: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + segment_aad.len());
    out.extend_from_slice(&chunk_ordinal.to_be_bytes());
    out.extend_from_slice(segment_aad);
    out
}
