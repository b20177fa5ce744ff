//! User settings, read from `settings.json` in the platform config directory.

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::crypto::{CipherAlgorithm, KdfAlgorithm, KdfParams};
use crate::history::{DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_AGE_DAYS};
use crate::storage::Storage;
use crate::strength::StrengthTier;

/// About a century.
pub const MAX_HISTORY_AGE_DAYS: i64 = 36_500;

/// KDF choice as written in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDerivationSettings {
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kib: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_cost: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
}

impl Default for KeyDerivationSettings {
    fn default() -> Self {
        Self::from_params(&KdfParams::default())
    }
}

impl KeyDerivationSettings {
    pub fn from_params(params: &KdfParams) -> Self {
        let mut settings = Self {
            algorithm: params.algorithm().name().to_string(),
            iterations: None,
            n: None,
            r: None,
            p: None,
            memory_kib: None,
            time_cost: None,
            parallelism: None,
        };
        match *params {
            KdfParams::Pbkdf2 { iterations } => settings.iterations = Some(iterations),
            KdfParams::Scrypt { n, r, p } => {
                settings.n = Some(n);
                settings.r = Some(r);
                settings.p = Some(p);
            }
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => {
                settings.memory_kib = Some(mem_cost_kib);
                settings.time_cost = Some(time_cost);
                settings.parallelism = Some(parallelism);
            }
        }
        settings
    }

    /// Resolves to concrete parameters; missing values take the KDF's defaults.
    pub fn to_params(&self) -> Result<KdfParams> {
        let algorithm: KdfAlgorithm = self.algorithm.parse()?;
        let params = match (algorithm, KdfParams::default_for(algorithm)) {
            (KdfAlgorithm::Pbkdf2, KdfParams::Pbkdf2 { iterations }) => {
                KdfParams::pbkdf2(self.iterations.unwrap_or(iterations))?
            }
            (KdfAlgorithm::Scrypt, KdfParams::Scrypt { n, r, p }) => KdfParams::scrypt(
                self.n.unwrap_or(n),
                self.r.unwrap_or(r),
                self.p.unwrap_or(p),
            )?,
            (
                KdfAlgorithm::Argon2id,
                KdfParams::Argon2id {
                    mem_cost_kib,
                    time_cost,
                    parallelism,
                },
            ) => KdfParams::argon2id(
                self.memory_kib.unwrap_or(mem_cost_kib),
                self.time_cost.unwrap_or(time_cost),
                self.parallelism.unwrap_or(parallelism),
            )?,
            _ => bail!("inconsistent defaults for {algorithm}"),
        };
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub default_algorithm: String,
    pub key_derivation: KeyDerivationSettings,
    pub history_limit: usize,
    pub history_max_age_days: i64,
    pub auto_save_history: bool,
    pub auto_clipboard: bool,
    pub min_password_tier: StrengthTier,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_algorithm: CipherAlgorithm::default().name().to_string(),
            key_derivation: KeyDerivationSettings::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_max_age_days: DEFAULT_MAX_AGE_DAYS,
            auto_save_history: true,
            auto_clipboard: false,
            min_password_tier: StrengthTier::Medium,
        }
    }
}

impl Settings {
    /// Loads settings from `storage`; a missing file yields the defaults.
    pub fn load(storage: &Storage) -> Result<Self> {
        let Some(data) = storage.load_if_exists()? else {
            return Ok(Self::default());
        };
        let settings: Settings = serde_json::from_slice(&data)
            .with_context(|| format!("invalid settings file {}", storage.path().display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.save(&serde_json::to_vec_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.algorithm()?;
        self.kdf_params()?;
        if !(1..=MAX_HISTORY_AGE_DAYS).contains(&self.history_max_age_days) {
            bail!("historyMaxAgeDays must be between 1 and {MAX_HISTORY_AGE_DAYS}");
        }
        Ok(())
    }

    pub fn algorithm(&self) -> Result<CipherAlgorithm> {
        Ok(self.default_algorithm.parse()?)
    }

    pub fn kdf_params(&self) -> Result<KdfParams> {
        self.key_derivation
            .to_params()
            .context("invalid keyDerivation settings")
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "msgseal").context("could not determine platform directories")
}

pub fn default_settings_storage() -> Result<Storage> {
    Ok(Storage::new(project_dirs()?.config_dir().join("settings.json")))
}

pub fn default_history_storage() -> Result<Storage> {
    Ok(Storage::new(project_dirs()?.data_dir().join("history.json")))
}

pub fn resolve_storage(path: Option<PathBuf>, fallback: fn() -> Result<Storage>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("settings.json"));
        let settings = Settings::load(&storage).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.algorithm().unwrap(), CipherAlgorithm::Aes256Gcm);
        assert_eq!(settings.kdf_params().unwrap(), KdfParams::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("settings.json"));

        let settings = Settings {
            default_algorithm: "ChaCha20-Poly1305".into(),
            key_derivation: KeyDerivationSettings::from_params(
                &KdfParams::scrypt(1024, 8, 1).unwrap(),
            ),
            history_limit: 5,
            ..Settings::default()
        };
        settings.save(&storage).unwrap();

        let loaded = Settings::load(&storage).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(
            loaded.kdf_params().unwrap(),
            KdfParams::Scrypt { n: 1024, r: 8, p: 1 }
        );
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("settings.json"));
        storage
            .save(br#"{"keyDerivation":{"algorithm":"scrypt","n":2048},"unknown":1}"#)
            .unwrap();

        let settings = Settings::load(&storage).unwrap();
        assert_eq!(settings.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(
            settings.kdf_params().unwrap(),
            KdfParams::Scrypt { n: 2048, r: 8, p: 1 }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("settings.json"));

        for body in [
            r#"{"defaultAlgorithm":"DES"}"#,
            r#"{"keyDerivation":{"algorithm":"bcrypt"}}"#,
            r#"{"keyDerivation":{"algorithm":"PBKDF2","iterations":0}}"#,
            r#"{"historyMaxAgeDays":0}"#,
            r#"{"historyMaxAgeDays":9223372036854775807}"#,
            r#"{"historyMaxAgeDays":36501}"#,
            "not json",
        ] {
            storage.save(body.as_bytes()).unwrap();
            assert!(Settings::load(&storage).is_err(), "accepted {body}");
        }
    }
}
