//! Cryptographic primitives for message bundles.
//!
//! Provides secure randomness, password-based key derivation and the
//! authenticated cipher suites.

pub mod cipher;
pub mod kdf;
pub mod random;

pub use cipher::{AesGcmSuite, ChaChaSuite, CipherAlgorithm, CipherSuite, RsaOaepSuite};
pub use kdf::{DerivationParameters, DerivedKey, KdfAlgorithm, KdfParams, derive_key};
pub use random::{OsRandom, RandomSource};

/// Length of the KDF salt (16 bytes), identical for every KDF.
pub const SALT_LEN: usize = 16;
/// Length of the symmetric encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
