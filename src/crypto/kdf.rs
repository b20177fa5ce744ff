use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::{KEY_LEN, SALT_LEN};
use crate::error::{PipelineError, PipelineResult};

/// Derived key material, wiped on drop.
pub type DerivedKey = Zeroizing<Vec<u8>>;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

pub const DEFAULT_SCRYPT_N: u64 = 16_384;
pub const DEFAULT_SCRYPT_R: u32 = 8;
pub const DEFAULT_SCRYPT_P: u32 = 1;
pub const MAX_SCRYPT_N: u64 = 1 << 20;
pub const MAX_SCRYPT_P: u32 = 16;
/// Upper bound for scrypt's `128 * N * r` working set (1 GiB).
const MAX_SCRYPT_MEMORY: u64 = 1 << 30;

pub const MAX_ARGON2_MEM_KIB: u32 = 1 << 20;
pub const MAX_ARGON2_TIME_COST: u32 = 100;
pub const MAX_ARGON2_PARALLELISM: u32 = 64;

/// Password-based key derivation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    Pbkdf2,
    Scrypt,
    Argon2id,
}

impl KdfAlgorithm {
    pub const ALL: [KdfAlgorithm; 3] = [
        KdfAlgorithm::Pbkdf2,
        KdfAlgorithm::Scrypt,
        KdfAlgorithm::Argon2id,
    ];

    /// Identifier written into bundle records.
    pub fn name(self) -> &'static str {
        match self {
            KdfAlgorithm::Pbkdf2 => "PBKDF2",
            KdfAlgorithm::Scrypt => "scrypt",
            KdfAlgorithm::Argon2id => "argon2id",
        }
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KdfAlgorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KdfAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PipelineError::key_derivation(format!("unsupported key derivation algorithm: {s}"))
            })
    }
}

/// Cost parameters of a key derivation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Pbkdf2 {
        iterations: u32,
    },
    Scrypt {
        n: u64,
        r: u32,
        p: u32,
    },
    Argon2id {
        mem_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn pbkdf2(iterations: u32) -> PipelineResult<Self> {
        Self::checked(KdfParams::Pbkdf2 { iterations })
    }

    pub fn scrypt(n: u64, r: u32, p: u32) -> PipelineResult<Self> {
        Self::checked(KdfParams::Scrypt { n, r, p })
    }

    pub fn argon2id(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> PipelineResult<Self> {
        Self::checked(KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        })
    }

    /// Default cost parameters for `algorithm`.
    pub fn default_for(algorithm: KdfAlgorithm) -> Self {
        match algorithm {
            KdfAlgorithm::Pbkdf2 => KdfParams::default(),
            KdfAlgorithm::Scrypt => KdfParams::Scrypt {
                n: DEFAULT_SCRYPT_N,
                r: DEFAULT_SCRYPT_R,
                p: DEFAULT_SCRYPT_P,
            },
            KdfAlgorithm::Argon2id => KdfParams::Argon2id {
                mem_cost_kib: 64 * 1024, // 64 MiB
                time_cost: 3,
                parallelism: 1,
            },
        }
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        match self {
            KdfParams::Pbkdf2 { .. } => KdfAlgorithm::Pbkdf2,
            KdfParams::Scrypt { .. } => KdfAlgorithm::Scrypt,
            KdfParams::Argon2id { .. } => KdfAlgorithm::Argon2id,
        }
    }

    fn checked(params: Self) -> PipelineResult<Self> {
        params.validate().map_err(PipelineError::invalid_input)?;
        Ok(params)
    }

    /// Checks the parameters against the accepted cost ranges.
    ///
    /// Returns the reason as plain text so callers can choose the error kind
    /// (caller-supplied overrides versus values read from a record).
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            KdfParams::Pbkdf2 { iterations } => {
                if iterations < 1 {
                    return Err("PBKDF2 iterations must be >= 1".into());
                }
                if iterations > MAX_PBKDF2_ITERATIONS {
                    return Err(format!(
                        "PBKDF2 iterations must be <= {MAX_PBKDF2_ITERATIONS}"
                    ));
                }
            }
            KdfParams::Scrypt { n, r, p } => {
                if n < 2 || !n.is_power_of_two() {
                    return Err("scrypt N must be a power of two >= 2".into());
                }
                if n > MAX_SCRYPT_N {
                    return Err(format!("scrypt N must be <= {MAX_SCRYPT_N}"));
                }
                if r < 1 || p < 1 {
                    return Err("scrypt r and p must be >= 1".into());
                }
                if u64::from(n.trailing_zeros()) >= 16 * u64::from(r) {
                    return Err("scrypt N must be < 2^(16 * r)".into());
                }
                if u64::from(r) * u64::from(p) >= 1 << 30 {
                    return Err("scrypt r * p must be < 2^30".into());
                }
                if 128 * n * u64::from(r) > MAX_SCRYPT_MEMORY {
                    return Err("scrypt memory cost (128 * N * r) exceeds 1 GiB".into());
                }
                if p > MAX_SCRYPT_P {
                    return Err(format!("scrypt p must be <= {MAX_SCRYPT_P}"));
                }
                // scrypt allocates 128 * r * p bytes up front
                if 128 * u64::from(r) * u64::from(p) > MAX_SCRYPT_MEMORY {
                    return Err("scrypt memory cost (128 * r * p) exceeds 1 GiB".into());
                }
            }
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => {
                if time_cost < 1 {
                    return Err("argon2 time cost must be >= 1".into());
                }
                if parallelism < 1 {
                    return Err("argon2 parallelism must be >= 1".into());
                }
                if mem_cost_kib < 8 * parallelism {
                    return Err("argon2 memory cost must be at least 8 * parallelism".into());
                }
                if mem_cost_kib > MAX_ARGON2_MEM_KIB
                    || time_cost > MAX_ARGON2_TIME_COST
                    || parallelism > MAX_ARGON2_PARALLELISM
                {
                    return Err("argon2 parameters exceed the supported maximum".into());
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdfParams::Pbkdf2 { iterations } => {
                write!(f, "PBKDF2-HMAC-SHA256 ({iterations} iterations)")
            }
            KdfParams::Scrypt { n, r, p } => write!(f, "scrypt (N={n}, r={r}, p={p})"),
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => write!(
                f,
                "argon2id (m={mem_cost_kib} KiB, t={time_cost}, p={parallelism})"
            ),
        }
    }
}

/// Everything needed to re-derive the key that sealed a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationParameters {
    params: KdfParams,
    salt: Vec<u8>,
    key_len: usize,
}

impl DerivationParameters {
    pub fn new(params: KdfParams, salt: Vec<u8>, key_len: usize) -> Self {
        Self {
            params,
            salt,
            key_len,
        }
    }

    /// Parameters with the standard salt and key sizes.
    pub fn with_salt(params: KdfParams, salt: [u8; SALT_LEN]) -> Self {
        Self::new(params, salt.to_vec(), KEY_LEN)
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        self.params.algorithm()
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }
}

/// Derive `params.key_len()` bytes of key material from `password`.
///
/// Deterministic for identical inputs. CPU bound: tens to hundreds of
/// milliseconds with default costs, so run it off latency-sensitive threads.
pub fn derive_key(password: &str, params: &DerivationParameters) -> PipelineResult<DerivedKey> {
    if password.is_empty() {
        return Err(PipelineError::invalid_input("password must not be empty"));
    }
    if params.salt.is_empty() {
        return Err(PipelineError::invalid_input("salt must not be empty"));
    }
    if params.key_len == 0 {
        return Err(PipelineError::invalid_input(
            "derived key length must be positive",
        ));
    }
    params
        .params
        .validate()
        .map_err(PipelineError::invalid_input)?;

    debug!(kdf = %params.params, key_len = params.key_len, "deriving key");

    let mut key = Zeroizing::new(vec![0u8; params.key_len]);

    match params.params {
        KdfParams::Pbkdf2 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &params.salt, iterations, &mut key[..]);
        }
        KdfParams::Scrypt { n, r, p } => {
            let log_n = n.trailing_zeros() as u8;
            let scrypt_params = scrypt::Params::new(log_n, r, p, params.key_len)
                .map_err(|e| PipelineError::key_derivation(format!("invalid scrypt params: {e}")))?;
            scrypt::scrypt(password.as_bytes(), &params.salt, &scrypt_params, &mut key[..])
                .map_err(|e| PipelineError::key_derivation(format!("scrypt failed: {e}")))?;
        }
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => {
            let argon_params =
                Params::new(mem_cost_kib, time_cost, parallelism, Some(params.key_len)).map_err(
                    |e| PipelineError::key_derivation(format!("invalid argon2 params: {e}")),
                )?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params)
                .hash_password_into(password.as_bytes(), &params.salt, &mut key[..])
                .map_err(|e| {
                    PipelineError::key_derivation(format!("argon2 key derivation failed: {e}"))
                })?;
        }
    }

    Ok(key)
}
