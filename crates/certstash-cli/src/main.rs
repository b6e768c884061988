//! certstash CLI - store and recover tokens hidden in certificates.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use certstash_core::{
    CredentialStore, FileStore, StoreId, StoreLocation, TokenReader, TokenWriter, VaultConfig,
    VaultError,
};

/// certstash - certificate-wrapped token storage
#[derive(Parser)]
#[command(name = "certstash")]
#[command(about = "Store connection tokens inside self-signed certificates", long_about = None)]
struct Cli {
    /// Root directory of the credential store
    #[arg(long, env = "CERTSTASH_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Store location
    #[arg(long, value_enum, default_value_t = Location::CurrentUser)]
    location: Location,

    /// Store name
    #[arg(long, default_value = "My")]
    store_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Location {
    CurrentUser,
    LocalMachine,
}

impl From<Location> for StoreLocation {
    fn from(location: Location) -> Self {
        match location {
            Location::CurrentUser => StoreLocation::CurrentUser,
            Location::LocalMachine => StoreLocation::LocalMachine,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Store a token for an identity, replacing any previous one
    Write {
        /// Identity name (certificate subject CN)
        identity: String,

        /// Token to store; read from the first line of stdin when omitted
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Print the token stored for an identity
    Read {
        /// Identity name
        identity: String,
    },

    /// List certificates in the store
    List,

    /// Remove every certificate for an identity
    Remove {
        /// Identity name
        identity: String,
    },
}

fn default_store_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".certstash"),
        None => PathBuf::from(".certstash"),
    }
}

fn token_from_stdin() -> io::Result<Option<String>> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let token = line.trim_end_matches(['\r', '\n']).to_string();
    Ok((!token.is_empty()).then_some(token))
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the token
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("certstash=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let root = cli.store_dir.unwrap_or_else(default_store_dir);
    let id = StoreId::new(cli.store_name, cli.location.into());
    debug!(root = %root.display(), store = %id, "using file store");

    let store: Arc<dyn CredentialStore> = Arc::new(FileStore::new(root, id));
    let config = VaultConfig::default();

    match cli.command {
        Commands::Write { identity, token } => {
            let token = match token {
                Some(token) => Some(token),
                None => token_from_stdin()?,
            };
            let token = token.ok_or(VaultError::MissingToken)?;

            let thumbprint = TokenWriter::new(store, &config).write(&identity, &token)?;
            println!("{}", thumbprint);
        }
        Commands::Read { identity } => {
            match TokenReader::new(store, &config).read(&identity)? {
                Some(token) => println!("{}", token.expose()),
                None => {
                    eprintln!("No token stored for '{}'", identity);
                    return Ok(ExitCode::from(1));
                }
            }
        }
        Commands::List => {
            let summaries = TokenReader::new(store, &config).list()?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Commands::Remove { identity } => {
            let removed = TokenWriter::new(store, &config).remove(&identity)?;
            println!("Removed {} certificate(s)", removed);
        }
    }

    Ok(ExitCode::SUCCESS)
}
