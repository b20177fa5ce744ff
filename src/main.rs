use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

mod auth;
use msgseal::config::resolve_storage;
use msgseal::{
    CancelFlag, CipherAlgorithm, ErrorKind, Hooks, KdfAlgorithm, KdfParams, Msgseal,
    PipelineError, Progress, Settings, Storage, default_history_storage,
    default_settings_storage, format, strength,
};

#[derive(Debug, clap::Args)]
struct KdfArgs {
    /// Key derivation function: PBKDF2, scrypt or argon2id
    #[arg(long)]
    kdf: Option<KdfAlgorithm>,

    /// PBKDF2 iteration count (default: 100000)
    #[arg(long)]
    iterations: Option<u32>,

    /// scrypt cost N, a power of two (default: 16384)
    #[arg(long = "scrypt-n")]
    scrypt_n: Option<u64>,

    /// scrypt block size r (default: 8)
    #[arg(long = "scrypt-r")]
    scrypt_r: Option<u32>,

    /// scrypt parallelism p (default: 1)
    #[arg(long = "scrypt-p")]
    scrypt_p: Option<u32>,

    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl KdfArgs {
    /// `None` when nothing was given on the command line.
    fn to_kdf_params(&self) -> Result<Option<KdfParams>> {
        let scrypt_given = self.scrypt_n.is_some() || self.scrypt_r.is_some() || self.scrypt_p.is_some();
        let argon_given =
            self.mem_cost_kib.is_some() || self.time_cost.is_some() || self.parallelism.is_some();

        let algorithm = match self.kdf {
            Some(a) => a,
            None if scrypt_given => KdfAlgorithm::Scrypt,
            None if argon_given => KdfAlgorithm::Argon2id,
            None if self.iterations.is_some() => KdfAlgorithm::Pbkdf2,
            None => return Ok(None),
        };

        let params = match KdfParams::default_for(algorithm) {
            KdfParams::Pbkdf2 { iterations } => {
                KdfParams::pbkdf2(self.iterations.unwrap_or(iterations))?
            }
            KdfParams::Scrypt { n, r, p } => KdfParams::scrypt(
                self.scrypt_n.unwrap_or(n),
                self.scrypt_r.unwrap_or(r),
                self.scrypt_p.unwrap_or(p),
            )?,
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => KdfParams::argon2id(
                self.mem_cost_kib.unwrap_or(mem_cost_kib),
                self.time_cost.unwrap_or(time_cost),
                self.parallelism.unwrap_or(parallelism),
            )?,
        };
        Ok(Some(params))
    }
}

#[derive(Debug, clap::Args)]
struct OutputArgs {
    /// Write the result to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Also copy the result to the clipboard
    #[arg(long)]
    copy: bool,

    /// Report pipeline stages on stderr
    #[arg(long)]
    progress: bool,

    /// Do not record this operation in the history
    #[arg(long)]
    no_history: bool,
}

#[derive(Debug, Parser)]
#[command(name = "msgseal")]
#[command(
    version,
    about = "Password-based message encryption with self-describing records."
)]
struct Cli {
    /// Path to the history file
    #[arg(long, global = true, value_name = "PATH", env = "MSGSEAL_HISTORY")]
    history: Option<PathBuf>,

    /// Path to the settings file
    #[arg(long, global = true, value_name = "PATH", env = "MSGSEAL_SETTINGS")]
    settings: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts a message into a text record
    Encrypt {
        /// Message text; read from --input or stdin when omitted
        message: Option<String>,

        #[arg(short, long, value_name = "FILE", conflicts_with = "message")]
        input: Option<PathBuf>,

        /// AES-256-GCM, ChaCha20-Poly1305 or RSA-OAEP
        #[arg(short, long)]
        algorithm: Option<CipherAlgorithm>,

        #[command(flatten)]
        kdf: KdfArgs,

        /// Accept passwords below the configured strength tier
        #[arg(long)]
        allow_weak: bool,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Decrypts a text record
    Decrypt {
        /// Record text; read from --input or stdin when omitted
        record: Option<String>,

        #[arg(short, long, value_name = "FILE", conflicts_with = "record")]
        input: Option<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Shows the metadata of a record without decrypting it
    Inspect {
        record: Option<String>,

        #[arg(short, long, value_name = "FILE", conflicts_with = "record")]
        input: Option<PathBuf>,
    },

    /// Rates a password
    Strength { password: Option<String> },

    /// Manages the message history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Prints the effective settings
    Config,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    /// Lists entries, newest first
    List,
    /// Shows one entry including its record
    #[command(arg_required_else_help = true)]
    Show { id: String },
    /// Removes one entry
    #[command(arg_required_else_help = true)]
    Remove { id: String },
    /// Removes every entry
    Clear,
    /// Writes the history as JSON
    Export {
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Replaces the history with an exported file
    #[command(arg_required_else_help = true)]
    Import { file: PathBuf },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("MSGSEAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("msgseal=debug"),
        _ => EnvFilter::new("msgseal=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<PipelineError>().map(PipelineError::kind) {
        Some(ErrorKind::AuthenticationFailed) => ExitCode::from(4),
        Some(kind) if kind.is_fatal() => ExitCode::from(5),
        _ => ExitCode::FAILURE,
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&resolve_storage(cli.settings, default_settings_storage)?)?;
    let history = resolve_storage(cli.history, default_history_storage)?;

    match cli.command {
        Commands::Encrypt {
            message,
            input,
            algorithm,
            kdf,
            allow_weak,
            out,
        } => {
            let kdf = kdf.to_kdf_params()?;
            let (plaintext, stdin_used) = read_input(message, input)?;
            let password = auth::read_new_password(!stdin_used)?;

            let mut ms = Msgseal::open(settings, history)?;
            if !allow_weak {
                ms.check_password(&password)?;
            }
            ms.set_record_history(ms.settings().auto_save_history && !out.no_history);

            let cancel = cancel_on_ctrlc();
            let sealed = ms.encrypt(
                &plaintext,
                &password,
                algorithm,
                kdf,
                hooks(&cancel, out.progress),
            )?;
            ms.save()?;

            let copy = out.copy || ms.settings().auto_clipboard;
            emit(sealed.record(), out.output, copy)?;
        }
        Commands::Decrypt { record, input, out } => {
            let (record, stdin_used) = read_input(record, input)?;
            let password = auth::read_password(!stdin_used)?;

            let mut ms = Msgseal::open(settings, history)?;
            ms.set_record_history(ms.settings().auto_save_history && !out.no_history);

            let cancel = cancel_on_ctrlc();
            let opened = ms.decrypt(&record, &password, hooks(&cancel, out.progress))?;
            ms.save()?;

            let copy = out.copy || ms.settings().auto_clipboard;
            emit(opened.plaintext(), out.output, copy)?;
        }
        Commands::Inspect { record, input } => {
            let (record, _) = read_input(record, input)?;
            let bundle = format::decode(&record)?;
            let algorithm = bundle.algorithm();

            println!("Algorithm:      {algorithm} ({})", algorithm.description());
            println!("Key derivation: {}", bundle.derivation().params());
            println!("Key length:     {} bytes", bundle.derivation().key_len());
            println!("Salt:           {}", hex::encode(bundle.salt()));
            println!("Nonce:          {}", hex::encode(bundle.nonce()));
            println!("Ciphertext:     {} bytes", bundle.ciphertext().len());
            println!("Plaintext:      {} bytes", bundle.plaintext_len());
            println!("Created:        {}", bundle.created_at().to_rfc3339());
        }
        Commands::Strength { password } => {
            let password = match password {
                Some(pw) => Zeroizing::new(pw),
                None => auth::read_password(true)?,
            };
            let report = strength::evaluate(&password);

            println!("Score: {}/6", report.score);
            println!("Tier:  {}", report.tier);
            if !report.suggestions.is_empty() {
                println!("Suggestions:");
                for s in &report.suggestions {
                    println!("  - {s}");
                }
            }
        }
        Commands::History(cmd) => run_history(cmd, Msgseal::open(settings, history)?)?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

fn run_history(cmd: HistoryCommand, mut ms: Msgseal) -> Result<()> {
    match cmd {
        HistoryCommand::List => {
            let entries: Vec<_> = ms.history().entries().collect();

            if entries.is_empty() {
                println!("No messages in history.");
                return Ok(());
            }

            let id_width = entries
                .iter()
                .map(|e| e.id().len())
                .chain(std::iter::once("Id".len()))
                .max()
                .unwrap_or_default();

            println!(
                "{:<id_width$}  {:<9}  {:<17}  {:<24}  {:>8}",
                "Id", "Kind", "Algorithm", "Timestamp", "Length"
            );
            println!("{:-<id_width$}  {:-<9}  {:-<17}  {:-<24}  {:->8}", "", "", "", "", "");

            for e in entries {
                println!(
                    "{:<id_width$}  {:<9}  {:<17}  {:<24}  {:>8}",
                    e.id(),
                    kind_label(e.kind()),
                    e.algorithm(),
                    e.timestamp().format("%Y-%m-%d %H:%M:%S UTC"),
                    e.original_length()
                );
            }
            println!();
            println!(
                "{} of {} messages kept (limit {})",
                ms.history().len(),
                ms.history().total_count(),
                ms.history().limit()
            );
        }
        HistoryCommand::Show { id } => {
            let Some(e) = ms.history().get(&id) else {
                bail!("history entry not found: {id}");
            };
            println!("Id:        {}", e.id());
            println!("Kind:      {}", kind_label(e.kind()));
            println!("Algorithm: {}", e.algorithm());
            println!("Timestamp: {}", e.timestamp().to_rfc3339());
            println!("Original:  {} bytes", e.original_length());
            println!("Encrypted: {} bytes", e.encrypted_length());
            if let Some(record) = e.record() {
                println!("Record:    {record}");
            }
        }
        HistoryCommand::Remove { id } => {
            ms.remove_entry(&id)?;
            ms.save()?;
            println!("history entry '{id}' removed");
        }
        HistoryCommand::Clear => {
            ms.clear_history()?;
            println!("history cleared");
        }
        HistoryCommand::Export { output } => {
            let data = ms.history().export();
            match output {
                Some(path) => {
                    Storage::new(path.clone()).save(data.as_bytes())?;
                    println!("history exported to {}", path.display());
                }
                None => println!("{data}"),
            }
        }
        HistoryCommand::Import { file } => {
            let data = Storage::new(file).load()?;
            let text = String::from_utf8(data).context("history export is not valid UTF-8")?;
            ms.import_history(&text)?;
            ms.save()?;
            println!("imported {} history entries", ms.history().len());
        }
    }
    Ok(())
}

fn kind_label(kind: msgseal::EntryKind) -> &'static str {
    match kind {
        msgseal::EntryKind::Encrypted => "encrypted",
        msgseal::EntryKind::Decrypted => "decrypted",
    }
}

/// Returns the text and whether stdin was consumed for it.
fn read_input(inline: Option<String>, file: Option<PathBuf>) -> Result<(Zeroizing<String>, bool)> {
    if let Some(text) = inline {
        return Ok((Zeroizing::new(text), false));
    }
    if let Some(path) = file {
        let data = Storage::new(path.clone()).load()?;
        let text = String::from_utf8(data)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        return Ok((Zeroizing::new(text), false));
    }
    if io::stdin().is_terminal() {
        bail!("no input given (pass it as an argument, with --input, or on stdin)");
    }

    let mut text = Zeroizing::new(String::new());
    io::stdin().read_to_string(&mut text)?;
    auth::trim_newline(&mut text);
    Ok((text, true))
}

fn emit(text: &str, output: Option<PathBuf>, copy: bool) -> Result<()> {
    match output {
        Some(path) => {
            Storage::new(path.clone()).save(text.as_bytes())?;
            eprintln!("written to {}", path.display());
        }
        None => println!("{text}"),
    }

    if copy {
        match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_owned())) {
            Ok(()) => eprintln!("copied to clipboard"),
            Err(e) => warn!("clipboard unavailable: {e}"),
        }
    }
    Ok(())
}

fn cancel_on_ctrlc() -> CancelFlag {
    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handle.cancel()) {
        warn!("could not install Ctrl-C handler: {e}");
    }
    cancel
}

fn print_progress(p: &Progress) {
    eprintln!("[{:>3}%] {}", p.percent, p.message);
}

fn hooks(cancel: &CancelFlag, progress: bool) -> Hooks<'_> {
    let hooks = Hooks::default().with_cancel(cancel);
    if progress {
        hooks.with_observer(&print_progress)
    } else {
        hooks
    }
}
