//! Encryption pipeline: RandomSource -> KeyDerivation -> CipherSuite -> Bundle codec.
//!
//! Every operation walks the stages `Preparing -> Deriving -> Transforming
//! -> Finalizing -> Complete`, or ends in `Failed` from whichever stage
//! went wrong. Observers are told about each transition; they are advisory
//! and cannot influence the result. Cancellation is only honored between
//! stages, never in the middle of a derivation or cipher call.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{
    CipherAlgorithm, DerivationParameters, KdfParams, OsRandom, RandomSource, SALT_LEN, derive_key,
};
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::format::{self, CiphertextBundle, header_aad};

/// Largest plaintext accepted by `encrypt` (16 MiB).
pub const MAX_PLAINTEXT_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preparing,
    Deriving,
    Transforming,
    Finalizing,
    Complete,
    Failed,
}

impl Stage {
    /// Nominal completion percentage once this stage is entered.
    pub fn percent(self) -> u8 {
        match self {
            Stage::Preparing => 10,
            Stage::Deriving => 30,
            Stage::Transforming => 60,
            Stage::Finalizing => 90,
            Stage::Complete => 100,
            Stage::Failed => 0,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Preparing => "preparing",
            Stage::Deriving => "deriving",
            Stage::Transforming => "transforming",
            Stage::Finalizing => "finalizing",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        })
    }
}

/// Progress notification sent at every stage transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    /// 0..=100. A `Failed` notification repeats the percent last reached.
    pub percent: u8,
    pub message: &'static str,
}

pub trait ProgressObserver {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress),
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Shared cancellation request, checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Optional host integrations for a single operation.
#[derive(Clone, Copy, Default)]
pub struct Hooks<'a> {
    observer: Option<&'a dyn ProgressObserver>,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> Hooks<'a> {
    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Tracks the stage of one operation and reports transitions.
struct Run<'a> {
    operation: &'static str,
    hooks: Hooks<'a>,
    percent: u8,
}

impl<'a> Run<'a> {
    fn new(operation: &'static str, hooks: Hooks<'a>) -> Self {
        Self {
            operation,
            hooks,
            percent: 0,
        }
    }

    fn enter(&mut self, stage: Stage, message: &'static str) -> PipelineResult<()> {
        if self.hooks.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(PipelineError::new(
                ErrorKind::Cancelled,
                format!("{} cancelled before {stage}", self.operation),
            ));
        }
        self.notify(stage, stage.percent(), message);
        Ok(())
    }

    fn notify(&mut self, stage: Stage, percent: u8, message: &'static str) {
        self.percent = percent;
        debug!(operation = self.operation, %stage, percent, "pipeline stage");
        if let Some(observer) = self.hooks.observer {
            observer.on_progress(&Progress {
                stage,
                percent,
                message,
            });
        }
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        warn!(operation = self.operation, kind = %err.kind(), "pipeline failed");
        self.notify(Stage::Failed, self.percent, err.kind().user_message());
        err
    }
}

/// Output of a successful `encrypt`.
#[derive(Debug, Clone)]
pub struct Sealed {
    bundle: CiphertextBundle,
    record: String,
}

impl Sealed {
    pub fn bundle(&self) -> &CiphertextBundle {
        &self.bundle
    }

    /// The portable text record.
    pub fn record(&self) -> &str {
        &self.record
    }

    pub fn into_record(self) -> String {
        self.record
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.bundle.algorithm()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.bundle.created_at()
    }
}

/// Output of a successful `decrypt`. The plaintext is wiped on drop.
pub struct Opened {
    plaintext: Zeroizing<String>,
    algorithm: CipherAlgorithm,
    created_at: DateTime<Utc>,
}

impl Opened {
    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    pub fn into_plaintext(self) -> Zeroizing<String> {
        self.plaintext
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opened")
            .field("plaintext", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Stateless orchestrator; calls share nothing but the random source, so a
/// single pipeline can serve concurrent operations.
#[derive(Debug, Clone, Default)]
pub struct Pipeline<R = OsRandom> {
    random: R,
}

impl Pipeline<OsRandom> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: RandomSource> Pipeline<R> {
    pub fn with_random_source(random: R) -> Self {
        Self { random }
    }

    /// Encrypt `plaintext` under `password`. Fresh salt and nonce every call.
    pub fn encrypt(
        &self,
        plaintext: &str,
        password: &str,
        algorithm: CipherAlgorithm,
        kdf: Option<KdfParams>,
    ) -> PipelineResult<Sealed> {
        self.encrypt_with(plaintext, password, algorithm, kdf, Hooks::default())
    }

    pub fn encrypt_with(
        &self,
        plaintext: &str,
        password: &str,
        algorithm: CipherAlgorithm,
        kdf: Option<KdfParams>,
        hooks: Hooks<'_>,
    ) -> PipelineResult<Sealed> {
        let mut run = Run::new("encrypt", hooks);
        self.seal(&mut run, plaintext, password, algorithm, kdf)
            .map_err(|e| run.fail(e))
    }

    /// Decrypt a text record with `password`.
    pub fn decrypt(&self, record: &str, password: &str) -> PipelineResult<Opened> {
        self.decrypt_with(record, password, Hooks::default())
    }

    pub fn decrypt_with(
        &self,
        record: &str,
        password: &str,
        hooks: Hooks<'_>,
    ) -> PipelineResult<Opened> {
        let mut run = Run::new("decrypt", hooks);
        self.open(&mut run, record, password)
            .map_err(|e| run.fail(e))
    }

    fn seal(
        &self,
        run: &mut Run<'_>,
        plaintext: &str,
        password: &str,
        algorithm: CipherAlgorithm,
        kdf: Option<KdfParams>,
    ) -> PipelineResult<Sealed> {
        run.enter(Stage::Preparing, "Generating salt and nonce...")?;

        if plaintext.is_empty() {
            return Err(PipelineError::invalid_input("plaintext must not be empty"));
        }
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(PipelineError::invalid_input(format!(
                "plaintext exceeds {MAX_PLAINTEXT_LEN} bytes"
            )));
        }
        if password.is_empty() {
            return Err(PipelineError::invalid_input("password must not be empty"));
        }
        let suite = algorithm.suite();
        suite.ensure_available()?;

        let params = kdf.unwrap_or_default();
        params.validate().map_err(PipelineError::invalid_input)?;

        let mut salt = [0u8; SALT_LEN];
        self.random.fill(&mut salt)?;
        let nonce = self.random.random_bytes(algorithm.nonce_len())?;
        let derivation = DerivationParameters::new(params, salt.to_vec(), algorithm.key_len());
        let created_at = format::now();

        run.enter(Stage::Deriving, "Deriving encryption key...")?;
        let key = derive_key(password, &derivation)?;

        run.enter(Stage::Transforming, "Encrypting data...")?;
        let aad = header_aad(algorithm, &derivation, created_at);
        let ciphertext = suite.seal(&key, &nonce, plaintext.as_bytes(), &aad)?;
        drop(key);

        run.enter(Stage::Finalizing, "Finalizing encryption...")?;
        let bundle = CiphertextBundle::new(algorithm, derivation, nonce, ciphertext, created_at)?;
        let record = format::encode(&bundle);

        run.notify(Stage::Complete, 100, "Encryption complete!");
        info!(
            algorithm = %algorithm,
            kdf = %params,
            len = plaintext.len(),
            "message sealed"
        );

        Ok(Sealed { bundle, record })
    }

    fn open(&self, run: &mut Run<'_>, record: &str, password: &str) -> PipelineResult<Opened> {
        run.enter(Stage::Preparing, "Preparing decryption...")?;

        if password.is_empty() {
            return Err(PipelineError::invalid_input("password must not be empty"));
        }
        let bundle = format::decode(record)?;
        let algorithm = bundle.algorithm();
        let suite = algorithm.suite();
        suite.ensure_available()?;

        run.enter(Stage::Deriving, "Deriving decryption key...")?;
        let key = derive_key(password, bundle.derivation())?;

        run.enter(Stage::Transforming, "Decrypting data...")?;
        let mut plaintext = suite.open(
            &key,
            bundle.nonce(),
            bundle.ciphertext(),
            &bundle.associated_data(),
        )?;
        drop(key);

        run.enter(Stage::Finalizing, "Finalizing decryption...")?;
        let text = match String::from_utf8(std::mem::take(&mut *plaintext)) {
            Ok(text) => Zeroizing::new(text),
            Err(e) => {
                e.into_bytes().zeroize();
                return Err(PipelineError::malformed(
                    "decrypted message is not valid UTF-8",
                ));
            }
        };

        run.notify(Stage::Complete, 100, "Decryption complete!");
        info!(algorithm = %algorithm, "message opened");

        Ok(Opened {
            plaintext: text,
            algorithm,
            created_at: bundle.created_at(),
        })
    }
}
