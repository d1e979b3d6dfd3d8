//! Envelope encryption: a per-segment symmetric data key wrapped under an
//! asymmetric key pair, plus the AES-256-GCM cipher used to encrypt/decrypt
//! individual chunks.

pub mod envelope;

pub use envelope::{DataKey, EnvelopeCrypto};
