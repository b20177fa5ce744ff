//! Portable text record for [`CiphertextBundle`].
//!
//! A single-line JSON object. Binary fields use hex (salt, nonce) and
//! standard base64 (ciphertext):
//! ```text
//! {"algorithm":"AES-256-GCM",
//!  "kdf":{"algorithm":"PBKDF2","salt":"<hex>","iterations":100000,"keyLength":32},
//!  "nonce":"<hex>","ciphertext":"<base64>","createdAt":"2026-01-01T00:00:00.000Z"}
//! ```
//! scrypt records carry `n`, `r`, `p`; argon2id records carry `memoryKib`,
//! `timeCost`, `parallelism`. Unknown fields are ignored.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CiphertextBundle, format_timestamp};
use crate::crypto::{CipherAlgorithm, DerivationParameters, KdfAlgorithm, KdfParams};
use crate::error::{PipelineError, PipelineResult};

/// Records larger than this are rejected before parsing (32 MiB).
pub const MAX_RECORD_LEN: usize = 32 * 1024 * 1024;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kdf: Option<KdfRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ciphertext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KdfRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_kib: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_cost: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallelism: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_length: Option<usize>,
}

/// Serializes a bundle to its text record.
pub fn encode(bundle: &CiphertextBundle) -> String {
    let derivation = bundle.derivation();
    let mut kdf = KdfRecord {
        algorithm: Some(derivation.algorithm().name().to_string()),
        salt: Some(hex::encode(derivation.salt())),
        key_length: Some(derivation.key_len()),
        ..KdfRecord::default()
    };
    match *derivation.params() {
        KdfParams::Pbkdf2 { iterations } => kdf.iterations = Some(iterations),
        KdfParams::Scrypt { n, r, p } => {
            kdf.n = Some(n);
            kdf.r = Some(r);
            kdf.p = Some(p);
        }
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => {
            kdf.memory_kib = Some(mem_cost_kib);
            kdf.time_cost = Some(time_cost);
            kdf.parallelism = Some(parallelism);
        }
    }

    let record = Record {
        algorithm: Some(bundle.algorithm().name().to_string()),
        kdf: Some(kdf),
        nonce: Some(hex::encode(bundle.nonce())),
        ciphertext: Some(STANDARD.encode(bundle.ciphertext())),
        created_at: Some(format_timestamp(bundle.created_at())),
    };

    // Only strings and integers: serialization cannot fail.
    serde_json::to_string(&record).unwrap_or_default()
}

fn required<T>(value: Option<T>, field: &str) -> PipelineResult<T> {
    value.ok_or_else(|| PipelineError::malformed(format!("missing field '{field}'")))
}

fn decode_hex(value: &str, field: &str) -> PipelineResult<Vec<u8>> {
    hex::decode(value.trim())
        .map_err(|e| PipelineError::malformed(format!("field '{field}' is not valid hex: {e}")))
}

/// Parses and validates a text record.
///
/// Every structural problem (missing field, unknown cipher algorithm, bad
/// encoding, salt or nonce of the wrong size, out-of-range KDF costs) is
/// reported as `MalformedBundle` before any cryptographic work happens.
/// An unknown KDF name is reported as `KeyDerivationFailed`.
pub fn decode(text: &str) -> PipelineResult<CiphertextBundle> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PipelineError::malformed("record is empty"));
    }
    if text.len() > MAX_RECORD_LEN {
        return Err(PipelineError::malformed(format!(
            "record exceeds {MAX_RECORD_LEN} bytes"
        )));
    }

    let record: Record = serde_json::from_str(text)
        .map_err(|e| PipelineError::malformed(format!("record is not valid JSON: {e}")))?;

    let algorithm_name = required(record.algorithm, "algorithm")?;
    let algorithm: CipherAlgorithm = algorithm_name
        .parse()
        .map_err(|_| PipelineError::malformed(format!("unknown algorithm '{algorithm_name}'")))?;

    let kdf = required(record.kdf, "kdf")?;
    let kdf_algorithm: KdfAlgorithm = required(kdf.algorithm, "kdf.algorithm")?.parse()?;
    let params = match kdf_algorithm {
        KdfAlgorithm::Pbkdf2 => KdfParams::Pbkdf2 {
            iterations: required(kdf.iterations, "kdf.iterations")?,
        },
        KdfAlgorithm::Scrypt => KdfParams::Scrypt {
            n: required(kdf.n, "kdf.n")?,
            r: required(kdf.r, "kdf.r")?,
            p: required(kdf.p, "kdf.p")?,
        },
        KdfAlgorithm::Argon2id => KdfParams::Argon2id {
            mem_cost_kib: required(kdf.memory_kib, "kdf.memoryKib")?,
            time_cost: required(kdf.time_cost, "kdf.timeCost")?,
            parallelism: required(kdf.parallelism, "kdf.parallelism")?,
        },
    };
    let salt = decode_hex(&required(kdf.salt, "kdf.salt")?, "kdf.salt")?;
    let key_len = required(kdf.key_length, "kdf.keyLength")?;

    let nonce = decode_hex(&required(record.nonce, "nonce")?, "nonce")?;
    let ciphertext = STANDARD
        .decode(required(record.ciphertext, "ciphertext")?.trim())
        .map_err(|e| PipelineError::malformed(format!("field 'ciphertext' is not valid base64: {e}")))?;

    let created_at_text = required(record.created_at, "createdAt")?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(created_at_text.trim())
        .map_err(|e| PipelineError::malformed(format!("field 'createdAt' is not RFC 3339: {e}")))?
        .with_timezone(&Utc);

    CiphertextBundle::new(
        algorithm,
        DerivationParameters::new(params, salt, key_len),
        nonce,
        ciphertext,
        created_at,
    )
}
