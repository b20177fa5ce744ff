pub mod config;
pub mod crypto;
pub mod error;
pub mod format;
pub mod history;
pub mod pipeline;
pub mod storage;
pub mod strength;

pub use crate::config::{Settings, default_history_storage, default_settings_storage};
pub use crate::crypto::{CipherAlgorithm, KdfAlgorithm, KdfParams, OsRandom, RandomSource};
pub use crate::error::{ErrorKind, HistoryError, PipelineError, PipelineResult};
pub use crate::format::CiphertextBundle;
pub use crate::history::{EntryKind, History, HistoryEntry};
pub use crate::pipeline::{CancelFlag, Hooks, Opened, Pipeline, Progress, Sealed, Stage};
pub use crate::storage::Storage;
pub use crate::strength::{StrengthReport, StrengthTier};

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use tracing::debug;

/// Encrypts with the default KDF and the OS random source.
pub fn encrypt(plaintext: &str, password: &str, algorithm: CipherAlgorithm) -> PipelineResult<Sealed> {
    Pipeline::new().encrypt(plaintext, password, algorithm, None)
}

pub fn decrypt(record: &str, password: &str) -> PipelineResult<Opened> {
    Pipeline::new().decrypt(record, password)
}

/// A pipeline bound to user settings and a persisted history.
pub struct Msgseal {
    pipeline: Pipeline,
    settings: Settings,
    history: History,
    storage: Storage,
    record_history: bool,
    dirty: bool,
}

impl Msgseal {
    /// Loads history from `storage` (empty if absent) and drops entries
    /// older than the configured maximum age.
    pub fn open(settings: Settings, storage: Storage) -> Result<Self> {
        let mut history = match storage.load_if_exists()? {
            Some(data) => History::from_json(&data, settings.history_limit)
                .with_context(|| format!("corrupted history file {}", storage.path().display()))?,
            None => History::new(settings.history_limit),
        };

        let max_age = Duration::try_days(settings.history_max_age_days)
            .context("historyMaxAgeDays is out of range")?;
        let pruned = history.prune(Utc::now(), max_age);
        if pruned > 0 {
            debug!(pruned, "dropped expired history entries");
        }

        Ok(Self {
            pipeline: Pipeline::new(),
            record_history: settings.auto_save_history,
            settings,
            history,
            storage,
            dirty: pruned > 0,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Turns history recording for subsequent operations on or off.
    pub fn set_record_history(&mut self, on: bool) {
        self.record_history = on;
    }

    /// Fails unless `password` reaches the configured minimum tier.
    pub fn check_password(&self, password: &str) -> Result<StrengthReport> {
        let report = strength::evaluate(password);
        if !report.meets(self.settings.min_password_tier) {
            bail!(
                "password is {} (required: {}): {}",
                report.tier,
                self.settings.min_password_tier,
                report.suggestions.join("; ")
            );
        }
        Ok(report)
    }

    /// Encrypts using `algorithm` and `kdf`, or the configured defaults.
    pub fn encrypt(
        &mut self,
        plaintext: &str,
        password: &str,
        algorithm: Option<CipherAlgorithm>,
        kdf: Option<KdfParams>,
        hooks: Hooks<'_>,
    ) -> Result<Sealed> {
        let algorithm = match algorithm {
            Some(a) => a,
            None => self.settings.algorithm()?,
        };
        let kdf = match kdf {
            Some(k) => k,
            None => self.settings.kdf_params()?,
        };

        let sealed = self
            .pipeline
            .encrypt_with(plaintext, password, algorithm, Some(kdf), hooks)?;

        self.record(HistoryEntry::new(
            EntryKind::Encrypted,
            algorithm,
            plaintext.len(),
            sealed.record().len(),
            Some(sealed.record().to_string()),
        ))?;
        Ok(sealed)
    }

    pub fn decrypt(&mut self, record: &str, password: &str, hooks: Hooks<'_>) -> Result<Opened> {
        let opened = self.pipeline.decrypt_with(record, password, hooks)?;

        self.record(HistoryEntry::new(
            EntryKind::Decrypted,
            opened.algorithm(),
            opened.plaintext().len(),
            record.trim().len(),
            Some(record.trim().to_string()),
        ))?;
        Ok(opened)
    }

    pub fn remove_entry(&mut self, id: &str) -> Result<()> {
        self.history.remove(id)?;
        self.dirty = true;
        Ok(())
    }

    /// Wipes every entry and deletes the history file.
    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        self.storage.remove()?;
        self.dirty = false;
        Ok(())
    }

    pub fn import_history(&mut self, data: &str) -> Result<()> {
        self.history.import(data)?;
        self.dirty = true;
        Ok(())
    }

    /// Writes the history back if anything changed.
    pub fn save(&mut self) -> Result<()> {
        if self.dirty {
            self.storage.save(&self.history.to_json())?;
            self.dirty = false;
        }
        Ok(())
    }

    fn record(&mut self, entry: HistoryEntry) -> Result<()> {
        if !self.record_history {
            return Ok(());
        }
        let id = self.history.add(entry, &OsRandom)?;
        debug!(%id, "history entry added");
        self.dirty = true;
        Ok(())
    }
}
