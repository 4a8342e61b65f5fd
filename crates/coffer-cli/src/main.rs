//! coffer: client-side content-addressed encrypted backup
//!
//! Commands:
//!   keygen   - generate a fresh armored key file
//!   encrypt  - back up a file or directory tree into a chunk store
//!   decrypt  - restore a backed-up path into the working directory
//!
//! Exit codes: 0 on success, 2 on usage errors, 1 on anything else.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;

use coffer_core::{path_key, CofferError, CofferResult, BLOCK_SIZE};
use coffer_crypto::{generate_key_file, KeyBundle, RandomIv};
use coffer_engine::backup::{encrypt_tree, ReuploadPolicy};
use coffer_engine::bootstrap::{fetch_metadata_db, upload_metadata_db};
use coffer_engine::restore::decrypt_tree;
use coffer_meta::MetaDb;
use coffer_store::open_chunkspec;

#[derive(Parser, Debug)]
#[command(
    name = "coffer",
    version,
    about = "Client-side content-addressed encrypted backup",
    long_about = "coffer: split files into fixed-size chunks, encrypt each chunk, \
store ciphertext under its authentication tag, and keep an encrypted, \
self-hosted metadata index so the tree can be rebuilt from the key file \
and store credentials alone."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a key file with fresh Encryption and Authentication keys
    Keygen {
        /// Where to write the armored key file (created mode 0600)
        #[arg(long, value_name = "PATH")]
        key_file: PathBuf,
    },

    /// Encrypt a file or directory tree into the chunk store
    Encrypt {
        /// Armored key file with Encryption and Authentication blocks
        #[arg(long, env = "COFFER_KEY_FILE", value_name = "PATH")]
        key_file: PathBuf,

        /// Where chunks live: local:DIR or gcs:JSON:BUCKET
        #[arg(long, env = "COFFER_CHUNKSPEC", value_name = "SPEC")]
        chunkspec: String,

        /// File or directory to encrypt, relative to the working
        /// directory; "." encrypts the whole working directory
        #[arg(long, value_name = "RELPATH")]
        file: PathBuf,

        /// Bytes of plaintext per encrypted chunk (multiple of 16)
        #[arg(long, value_name = "N")]
        chunk_bytes: usize,

        /// File or directory basenames to skip, semicolon-delimited
        #[arg(long, value_name = "A;B", default_value = "")]
        exclude_names: String,

        /// Use a local metadata database instead of fetching and
        /// re-uploading it through the chunk store
        #[arg(long, value_name = "PATH")]
        meta_file: Option<PathBuf>,

        /// Store every chunk afresh instead of reusing unchanged ones
        #[arg(long)]
        reupload: bool,
    },

    /// Decrypt a backed-up path into the working directory
    Decrypt {
        /// Armored key file with Encryption and Authentication blocks
        #[arg(long, env = "COFFER_KEY_FILE", value_name = "PATH")]
        key_file: PathBuf,

        /// Where chunks live: local:DIR or gcs:JSON:BUCKET
        #[arg(long, env = "COFFER_CHUNKSPEC", value_name = "SPEC")]
        chunkspec: String,

        /// Path to restore, relative to the working directory; "."
        /// restores everything
        #[arg(long, value_name = "RELPATH")]
        file: PathBuf,

        /// Use a local metadata database instead of fetching it from
        /// the chunk store
        #[arg(long, value_name = "PATH")]
        meta_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_usage() => {
            eprintln!("coffer: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("coffer: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

async fn run(command: Commands) -> CofferResult<()> {
    match command {
        Commands::Keygen { key_file } => {
            generate_key_file(&key_file)?;
            println!("wrote key file {}", key_file.display());
            Ok(())
        }
        Commands::Encrypt {
            key_file,
            chunkspec,
            file,
            chunk_bytes,
            exclude_names,
            meta_file,
            reupload,
        } => {
            if file.is_absolute() {
                return Err(CofferError::Usage("--file must be a relative path".to_string()));
            }
            if chunk_bytes == 0 || chunk_bytes % BLOCK_SIZE != 0 {
                return Err(CofferError::Usage(format!(
                    "--chunk-bytes must be a positive multiple of {BLOCK_SIZE}, got {chunk_bytes}"
                )));
            }

            let keys = KeyBundle::load(&key_file)?;
            let store = open_chunkspec(&chunkspec)?;
            let temp_dir = tempfile::tempdir()?;

            let managed_meta = meta_file.is_none();
            let meta_path = match meta_file {
                Some(path) => path,
                None => fetch_metadata_db(&store, &keys, temp_dir.path()).await?,
            };

            let excludes: HashSet<String> = exclude_names
                .split(';')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            let policy = if reupload {
                ReuploadPolicy::AlwaysUpload
            } else {
                ReuploadPolicy::ReuseUnchanged
            };

            let mut ivs = RandomIv;
            {
                let db = MetaDb::open(&meta_path)?;
                encrypt_tree(
                    &store,
                    &db,
                    &keys,
                    &mut ivs,
                    &file,
                    chunk_bytes,
                    &excludes,
                    policy,
                )
                .await?;
                // Dropped here: the bootstrap upload reads the closed
                // database file.
            }

            if managed_meta {
                upload_metadata_db(&store, &keys, &mut ivs, &meta_path, chunk_bytes).await?;
            } else {
                debug!("--meta-file given; skipping metadata upload");
            }
            Ok(())
        }
        Commands::Decrypt {
            key_file,
            chunkspec,
            file,
            meta_file,
        } => {
            if file.is_absolute() {
                return Err(CofferError::Usage("--file must be a relative path".to_string()));
            }

            let keys = KeyBundle::load(&key_file)?;
            let store = open_chunkspec(&chunkspec)?;
            let temp_dir = tempfile::tempdir()?;

            let meta_path = match meta_file {
                Some(path) => path,
                None => fetch_metadata_db(&store, &keys, temp_dir.path()).await?,
            };

            // Scratch lives under the working directory so the final
            // rename into place stays on one filesystem.
            let scratch = tempfile::Builder::new()
                .prefix(".coffer-restore")
                .tempdir_in(".")?;

            let db = MetaDb::open(&meta_path)?;
            decrypt_tree(&store, &db, &keys, &path_key(&file), scratch.path()).await?;
            Ok(())
        }
    }
}
