//! bitstego - deniable file hiding in random bitfields.
//!
//! Hides payloads bit by bit along passphrase-keyed pseudorandom trails
//! through a blob of random bytes, armored with chained error
//! correction so overlapping hidden payloads survive each other.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing_subscriber::EnvFilter;

use bitstego::{meta, FileBitField, ReadonlyBitField};

#[derive(Parser)]
#[command(name = "bitstego")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Deniable file hiding inside random bitfields",
    long_about = "Hides data along passphrase-keyed trails through a blob of random bytes. \
                  Without the passphrase, nothing in the blob reveals whether anything is hidden."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new random blob
    Create {
        /// Path for the new blob file
        blob: PathBuf,

        /// Data size in bytes (default: 10 MiB)
        #[arg(long, default_value = "10485760")]
        size: u64,
    },

    /// Hide a payload in a blob
    Hide {
        /// Blob file to hide into
        blob: PathBuf,

        /// Input file to hide
        #[arg(long, conflicts_with = "data")]
        input: Option<PathBuf>,

        /// String data to hide
        #[arg(long, conflicts_with = "input")]
        data: Option<String>,
    },

    /// Recover a hidden payload from a blob
    Reveal {
        /// Blob file to reveal from
        blob: PathBuf,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create { blob, size } => cmd_create(&blob, size),
        Commands::Hide { blob, input, data } => cmd_hide(&blob, input, data),
        Commands::Reveal { blob, output } => cmd_reveal(&blob, output),
    }
}

fn prompt_passphrase(prompt: &str) -> String {
    rpassword::prompt_password(prompt).unwrap_or_else(|_| {
        eprint!("{}", prompt);
        io::stderr().flush().unwrap();
        let mut passphrase = String::new();
        io::stdin().read_line(&mut passphrase).unwrap();
        passphrase.trim().to_string()
    })
}

fn cmd_create(blob: &PathBuf, size: u64) -> Result<()> {
    let field = FileBitField::create(blob, size, &mut OsRng)
        .with_context(|| format!("creating blob {}", blob.display()))?;
    field.close();

    println!("Blob created: {}", blob.display());
    println!("  Data size: {} bytes", size);
    Ok(())
}

fn cmd_hide(blob: &PathBuf, input: Option<PathBuf>, data: Option<String>) -> Result<()> {
    let passphrase = prompt_passphrase("Enter passphrase: ");
    let confirm = prompt_passphrase("Confirm passphrase: ");
    if passphrase != confirm {
        eprintln!("Passphrases do not match");
        std::process::exit(1);
    }

    let field = FileBitField::open(blob).with_context(|| format!("opening {}", blob.display()))?;

    let length = match (input, data) {
        (Some(path), None) => {
            let mut file =
                File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            meta::hide(&field, passphrase.as_bytes(), &mut file, &mut OsRng)?
        }
        (None, Some(data)) => {
            meta::hide(&field, passphrase.as_bytes(), &mut data.as_bytes(), &mut OsRng)?
        }
        _ => {
            let mut stdin = io::stdin().lock();
            meta::hide(&field, passphrase.as_bytes(), &mut stdin, &mut OsRng)?
        }
    };
    field.close();

    println!("Payload hidden: {} bytes", length);
    Ok(())
}

fn cmd_reveal(blob: &PathBuf, output: Option<PathBuf>) -> Result<()> {
    let passphrase = prompt_passphrase("Passphrase: ");

    let field =
        ReadonlyBitField::open(blob).with_context(|| format!("opening {}", blob.display()))?;

    let cancelled = AtomicBool::new(false);
    let record = meta::find(&field, passphrase.as_bytes(), &mut OsRng, &cancelled)?;

    let ratio = match output {
        Some(path) => {
            let mut file =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            meta::reveal(&field, &record, &mut file)?
        }
        None => {
            let mut stdout = io::stdout().lock();
            meta::reveal(&field, &record, &mut stdout)?
        }
    };
    field.close();

    if ratio > 0.0 {
        eprintln!("Recovered with damage, worst block error ratio: {:.3}", ratio);
    }
    Ok(())
}
