//! Authenticated encryption, one suite per [`CipherAlgorithm`].
//!
//! Every suite follows the same contract: `seal` returns ciphertext with the
//! authentication tag appended, `open` verifies the tag before releasing
//! any plaintext. A tag mismatch is always reported as
//! [`ErrorKind::AuthenticationFailed`](crate::error::ErrorKind), whatever
//! the cause (wrong key, wrong nonce, tampered ciphertext or associated data).

use std::fmt;
use std::str::FromStr;

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{AeadInPlace, KeyInit, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroizing;

use crate::error::{ErrorKind, PipelineError, PipelineResult};

/// Supported (and reserved) encryption algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    #[default]
    Aes256Gcm,
    ChaCha20Poly1305,
    /// Reserved for the asymmetric mode; every operation is `NotImplemented`.
    RsaOaep,
}

impl CipherAlgorithm {
    pub const ALL: [CipherAlgorithm; 3] = [
        CipherAlgorithm::Aes256Gcm,
        CipherAlgorithm::ChaCha20Poly1305,
        CipherAlgorithm::RsaOaep,
    ];

    /// Identifier written into bundle records.
    pub fn name(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "AES-256-GCM",
            CipherAlgorithm::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            CipherAlgorithm::RsaOaep => "RSA-OAEP",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "Advanced Encryption Standard with Galois/Counter Mode",
            CipherAlgorithm::ChaCha20Poly1305 => {
                "Modern stream cipher with Poly1305 authentication"
            }
            CipherAlgorithm::RsaOaep => "RSA with Optimal Asymmetric Encryption Padding",
        }
    }

    /// Key size in bits.
    pub fn key_bits(self) -> usize {
        match self {
            CipherAlgorithm::Aes256Gcm | CipherAlgorithm::ChaCha20Poly1305 => 256,
            CipherAlgorithm::RsaOaep => 2048,
        }
    }

    /// Length in bytes of the symmetric key derived from the password.
    /// Zero when the algorithm does not use a password-derived key.
    pub fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes256Gcm | CipherAlgorithm::ChaCha20Poly1305 => 32,
            CipherAlgorithm::RsaOaep => 0,
        }
    }

    pub fn nonce_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes256Gcm | CipherAlgorithm::ChaCha20Poly1305 => 12,
            CipherAlgorithm::RsaOaep => 0,
        }
    }

    pub fn tag_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes256Gcm | CipherAlgorithm::ChaCha20Poly1305 => 16,
            CipherAlgorithm::RsaOaep => 0,
        }
    }

    /// The suite that implements this algorithm.
    pub fn suite(self) -> &'static dyn CipherSuite {
        match self {
            CipherAlgorithm::Aes256Gcm => &AesGcmSuite,
            CipherAlgorithm::ChaCha20Poly1305 => &ChaChaSuite,
            CipherAlgorithm::RsaOaep => &RsaOaepSuite,
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // "RSA" is an older spelling of the same reserved algorithm.
        if s.eq_ignore_ascii_case("RSA") {
            return Ok(CipherAlgorithm::RsaOaep);
        }
        CipherAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                PipelineError::new(
                    ErrorKind::UnsupportedAlgorithm,
                    format!("unknown algorithm: {s}"),
                )
            })
    }
}

/// Authenticated encryption with associated data for one algorithm.
pub trait CipherSuite: Send + Sync {
    fn algorithm(&self) -> CipherAlgorithm;

    /// Fails with `NotImplemented` for algorithms reserved for later use.
    /// Checked before any key is derived.
    fn ensure_available(&self) -> PipelineResult<()> {
        Ok(())
    }

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    fn seal(&self, key: &[u8], nonce: &[u8], plaintext: &[u8], aad: &[u8])
    -> PipelineResult<Vec<u8>>;

    /// Verify and decrypt `ciphertext` (tag appended).
    ///
    /// On failure no plaintext is returned and the working buffer is wiped.
    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> PipelineResult<Zeroizing<Vec<u8>>>;
}

fn check_lengths(algorithm: CipherAlgorithm, key: &[u8], nonce: &[u8]) -> PipelineResult<()> {
    if key.len() != algorithm.key_len() {
        return Err(PipelineError::invalid_input(format!(
            "{algorithm} key must be {} bytes, got {}",
            algorithm.key_len(),
            key.len()
        )));
    }
    if nonce.len() != algorithm.nonce_len() {
        return Err(PipelineError::invalid_input(format!(
            "{algorithm} nonce must be {} bytes, got {}",
            algorithm.nonce_len(),
            nonce.len()
        )));
    }
    Ok(())
}

fn seal_with<C>(
    algorithm: CipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> PipelineResult<Vec<u8>>
where
    C: KeyInit + AeadInPlace,
{
    check_lengths(algorithm, key, nonce)?;
    let cipher = C::new_from_slice(key)
        .map_err(|_| PipelineError::invalid_input("invalid key length"))?;

    let mut buffer = Vec::with_capacity(plaintext.len() + algorithm.tag_len());
    buffer.extend_from_slice(plaintext);
    if cipher
        .encrypt_in_place(Nonce::<C>::from_slice(nonce), aad, &mut buffer)
        .is_err()
    {
        zeroize::Zeroize::zeroize(&mut buffer);
        return Err(PipelineError::new(
            ErrorKind::InvalidInput,
            format!("{algorithm} encryption failed"),
        ));
    }
    Ok(buffer)
}

fn open_with<C>(
    algorithm: CipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> PipelineResult<Zeroizing<Vec<u8>>>
where
    C: KeyInit + AeadInPlace,
{
    check_lengths(algorithm, key, nonce)?;
    if ciphertext.len() < algorithm.tag_len() {
        return Err(PipelineError::authentication_failed());
    }
    let cipher = C::new_from_slice(key)
        .map_err(|_| PipelineError::invalid_input("invalid key length"))?;

    // Dropping the wrapper on the error path wipes any partial output.
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    let inner: &mut Vec<u8> = &mut buffer;
    cipher
        .decrypt_in_place(Nonce::<C>::from_slice(nonce), aad, inner)
        .map_err(|_| PipelineError::authentication_failed())?;
    Ok(buffer)
}

/// AES-256-GCM (96-bit nonce, 128-bit tag).
#[derive(Debug, Clone, Copy)]
pub struct AesGcmSuite;

impl CipherSuite for AesGcmSuite {
    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::Aes256Gcm
    }

    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> PipelineResult<Vec<u8>> {
        seal_with::<Aes256Gcm>(self.algorithm(), key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> PipelineResult<Zeroizing<Vec<u8>>> {
        open_with::<Aes256Gcm>(self.algorithm(), key, nonce, ciphertext, aad)
    }
}

/// ChaCha20-Poly1305 (IETF, 96-bit nonce, 128-bit tag).
#[derive(Debug, Clone, Copy)]
pub struct ChaChaSuite;

impl CipherSuite for ChaChaSuite {
    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::ChaCha20Poly1305
    }

    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> PipelineResult<Vec<u8>> {
        seal_with::<ChaCha20Poly1305>(self.algorithm(), key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> PipelineResult<Zeroizing<Vec<u8>>> {
        open_with::<ChaCha20Poly1305>(self.algorithm(), key, nonce, ciphertext, aad)
    }
}

/// Placeholder for the asymmetric mode.
#[derive(Debug, Clone, Copy)]
pub struct RsaOaepSuite;

impl RsaOaepSuite {
    fn unavailable() -> PipelineError {
        PipelineError::not_implemented("RSA-OAEP encryption is not implemented")
    }
}

impl CipherSuite for RsaOaepSuite {
    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::RsaOaep
    }

    fn ensure_available(&self) -> PipelineResult<()> {
        Err(Self::unavailable())
    }

    fn seal(&self, _: &[u8], _: &[u8], _: &[u8], _: &[u8]) -> PipelineResult<Vec<u8>> {
        Err(Self::unavailable())
    }

    fn open(&self, _: &[u8], _: &[u8], _: &[u8], _: &[u8]) -> PipelineResult<Zeroizing<Vec<u8>>> {
        Err(Self::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];
    const NONCE: [u8; 12] = [9u8; 12];

    fn symmetric() -> [CipherAlgorithm; 2] {
        [CipherAlgorithm::Aes256Gcm, CipherAlgorithm::ChaCha20Poly1305]
    }

    #[test]
    fn seal_open_roundtrip() {
        for alg in symmetric() {
            let suite = alg.suite();
            let sealed = suite.seal(&KEY, &NONCE, b"secret data", b"hdr").unwrap();
            assert_eq!(sealed.len(), b"secret data".len() + alg.tag_len());

            let opened = suite.open(&KEY, &NONCE, &sealed, b"hdr").unwrap();
            assert_eq!(opened.as_slice(), b"secret data");
        }
    }

    #[test]
    fn algorithms_produce_different_ciphertexts() {
        let aes = AesGcmSuite.seal(&KEY, &NONCE, b"same", b"").unwrap();
        let chacha = ChaChaSuite.seal(&KEY, &NONCE, b"same", b"").unwrap();
        assert_ne!(aes, chacha);

        let err = ChaChaSuite.open(&KEY, &NONCE, &aes, b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn wrong_key_nonce_or_aad_fails_authentication() {
        for alg in symmetric() {
            let suite = alg.suite();
            let sealed = suite.seal(&KEY, &NONCE, b"payload", b"hdr").unwrap();

            let wrong_key = [8u8; 32];
            let wrong_nonce = [1u8; 12];
            let cases = [
                suite.open(&wrong_key, &NONCE, &sealed, b"hdr"),
                suite.open(&KEY, &wrong_nonce, &sealed, b"hdr"),
                suite.open(&KEY, &NONCE, &sealed, b"other"),
            ];
            for case in cases {
                assert_eq!(case.unwrap_err().kind(), ErrorKind::AuthenticationFailed);
            }
        }
    }

    #[test]
    fn every_flipped_byte_is_detected() {
        for alg in symmetric() {
            let suite = alg.suite();
            let sealed = suite.seal(&KEY, &NONCE, b"hello world", b"").unwrap();
            for i in 0..sealed.len() {
                let mut tampered = sealed.clone();
                tampered[i] ^= 0x01;
                let err = suite.open(&KEY, &NONCE, &tampered, b"").unwrap_err();
                assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
            }
        }
    }

    #[test]
    fn truncated_ciphertext_fails_authentication() {
        let err = AesGcmSuite.open(&KEY, &NONCE, &[0u8; 5], b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn wrong_lengths_are_invalid_input() {
        let err = AesGcmSuite.seal(&[0u8; 16], &NONCE, b"x", b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = ChaChaSuite.seal(&KEY, &[0u8; 24], b"x", b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn rsa_oaep_is_not_implemented() {
        let suite = CipherAlgorithm::RsaOaep.suite();
        assert_eq!(
            suite.ensure_available().unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            suite.seal(&KEY, &NONCE, b"x", b"").unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            suite.open(&KEY, &NONCE, b"x", b"").unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
    }

    #[test]
    fn algorithm_names_parse() {
        for alg in CipherAlgorithm::ALL {
            assert_eq!(alg.name().parse::<CipherAlgorithm>().unwrap(), alg);
        }
        assert_eq!(
            "aes-256-gcm".parse::<CipherAlgorithm>().unwrap(),
            CipherAlgorithm::Aes256Gcm
        );
        assert_eq!(
            "RSA".parse::<CipherAlgorithm>().unwrap(),
            CipherAlgorithm::RsaOaep
        );

        let err = "DES".parse::<CipherAlgorithm>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn sizes_match_algorithm_table() {
        for alg in symmetric() {
            assert_eq!(alg.key_bits(), 256);
            assert_eq!(alg.key_len() * 8, alg.key_bits());
            assert_eq!(alg.nonce_len(), 12);
            assert_eq!(alg.tag_len(), 16);
        }
        assert_eq!(CipherAlgorithm::RsaOaep.nonce_len(), 0);
    }
}
