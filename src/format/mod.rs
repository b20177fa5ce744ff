//! Ciphertext bundles and their portable text record.
//!
//! A bundle carries everything needed to attempt decryption given only the
//! password: cipher algorithm, KDF parameters and salt, nonce, ciphertext
//! (tag appended) and the creation time. The record is the only artifact
//! with a long-term format guarantee; see [`record`] for the layout.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::crypto::{CipherAlgorithm, DerivationParameters, KdfParams, SALT_LEN};
use crate::error::{PipelineError, PipelineResult};

pub mod record;

pub use record::{MAX_RECORD_LEN, decode, encode};

/// An immutable, self-describing encrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextBundle {
    algorithm: CipherAlgorithm,
    derivation: DerivationParameters,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl CiphertextBundle {
    /// Assembles a bundle, rejecting inconsistent sizes or parameters
    /// with `MalformedBundle`.
    pub fn new(
        algorithm: CipherAlgorithm,
        derivation: DerivationParameters,
        nonce: Vec<u8>,
        ciphertext: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> PipelineResult<Self> {
        let bundle = Self {
            algorithm,
            derivation,
            nonce,
            ciphertext,
            created_at: truncate_to_millis(created_at),
        };
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> PipelineResult<()> {
        let alg = self.algorithm;

        if self.derivation.salt().len() != SALT_LEN {
            return Err(PipelineError::malformed(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                self.derivation.salt().len()
            )));
        }
        if self.nonce.len() != alg.nonce_len() {
            return Err(PipelineError::malformed(format!(
                "{alg} nonce must be {} bytes, got {}",
                alg.nonce_len(),
                self.nonce.len()
            )));
        }
        if alg.key_len() != 0 && self.derivation.key_len() != alg.key_len() {
            return Err(PipelineError::malformed(format!(
                "{alg} key length must be {} bytes, got {}",
                alg.key_len(),
                self.derivation.key_len()
            )));
        }
        if self.ciphertext.len() <= alg.tag_len() {
            return Err(PipelineError::malformed(format!(
                "ciphertext must be longer than the {}-byte tag",
                alg.tag_len()
            )));
        }
        self.derivation
            .params()
            .validate()
            .map_err(PipelineError::malformed)
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    pub fn derivation(&self) -> &DerivationParameters {
        &self.derivation
    }

    pub fn salt(&self) -> &[u8] {
        self.derivation.salt()
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Ciphertext with the authentication tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Length of the sealed plaintext in bytes.
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len() - self.algorithm.tag_len()
    }

    /// Header fields bound to the ciphertext as associated data, so any edit
    /// to them fails authentication.
    pub fn associated_data(&self) -> Vec<u8> {
        header_aad(self.algorithm, &self.derivation, self.created_at)
    }
}

/// Associated data for a bundle that is about to be sealed.
pub(crate) fn header_aad(
    algorithm: CipherAlgorithm,
    derivation: &DerivationParameters,
    created_at: DateTime<Utc>,
) -> Vec<u8> {
    let kdf = match derivation.params() {
        KdfParams::Pbkdf2 { iterations } => format!("PBKDF2:{iterations}"),
        KdfParams::Scrypt { n, r, p } => format!("scrypt:{n}:{r}:{p}"),
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => format!("argon2id:{mem_cost_kib}:{time_cost}:{parallelism}"),
    };
    format!(
        "msgseal;{};{kdf};{};{}",
        algorithm.name(),
        derivation.key_len(),
        format_timestamp(created_at)
    )
    .into_bytes()
}

/// Current time at the millisecond precision stored in records.
pub fn now() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

pub(crate) fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::error::ErrorKind;

    fn derivation() -> DerivationParameters {
        DerivationParameters::with_salt(KdfParams::default(), [1u8; SALT_LEN])
    }

    #[test]
    fn bundle_accepts_consistent_parts() {
        let bundle = CiphertextBundle::new(
            CipherAlgorithm::Aes256Gcm,
            derivation(),
            vec![2u8; 12],
            vec![3u8; 20],
            now(),
        )
        .unwrap();
        assert_eq!(bundle.plaintext_len(), 4);
        assert_eq!(bundle.salt().len(), 16);
    }

    #[test]
    fn bundle_rejects_wrong_sizes() {
        let cases = [
            (
                DerivationParameters::new(KdfParams::default(), vec![1u8; 8], KEY_LEN),
                vec![2u8; 12],
                vec![3u8; 20],
            ),
            (derivation(), vec![2u8; 24], vec![3u8; 20]),
            (
                DerivationParameters::new(KdfParams::default(), vec![1u8; 16], 16),
                vec![2u8; 12],
                vec![3u8; 20],
            ),
            (derivation(), vec![2u8; 12], vec![3u8; 16]),
            (
                DerivationParameters::with_salt(KdfParams::Pbkdf2 { iterations: 0 }, [1u8; 16]),
                vec![2u8; 12],
                vec![3u8; 20],
            ),
        ];

        for (derivation, nonce, ciphertext) in cases {
            let err = CiphertextBundle::new(
                CipherAlgorithm::ChaCha20Poly1305,
                derivation,
                nonce,
                ciphertext,
                now(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedBundle);
        }
    }

    #[test]
    fn associated_data_covers_header_fields() {
        let created = now();
        let a = header_aad(CipherAlgorithm::Aes256Gcm, &derivation(), created);
        let b = header_aad(CipherAlgorithm::ChaCha20Poly1305, &derivation(), created);
        let c = header_aad(
            CipherAlgorithm::Aes256Gcm,
            &DerivationParameters::with_salt(KdfParams::pbkdf2(5).unwrap(), [1u8; 16]),
            created,
        );
        let d = header_aad(
            CipherAlgorithm::Aes256Gcm,
            &derivation(),
            created + chrono::Duration::milliseconds(1),
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn timestamps_keep_millisecond_precision() {
        let t = now();
        let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(&format_timestamp(t))
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, t);
    }
}
