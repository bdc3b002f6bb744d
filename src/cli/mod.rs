use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::crypto::DEFAULT_PBKDF2_ROUNDS;
use crate::options::DEFAULT_MAX_KDF_ITERATIONS;

/// Minimum password length accepted by `create`. Opening accepts any
/// non-empty password so older archives stay readable.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Environment variable consulted when `--password` is not given.
pub const PASSWORD_ENV: &str = "QCX_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a new encrypted archive from files and directories.
    #[command(alias = "c")]
    Create {
        /// One or more input files or directories to add to the archive.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// The path for the output archive (defaults to `<first input>.qcx`).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Archive password. If not provided, QCX_PASSWORD is used or the password is prompted for.
        #[arg(long)]
        password: Option<String>,

        /// PBKDF2 iteration count stored in the archive.
        #[arg(long, default_value_t = DEFAULT_PBKDF2_ROUNDS)]
        iterations: u32,

        /// zlib compression level (0-9).
        #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// Free-text note stored in the unencrypted header.
        #[arg(long)]
        note: Option<String>,

        /// Do not print progress messages.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Extract files from an archive.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// Entries to extract, by stored path or `#<index>`. If empty, all files are extracted.
        files: Vec<String>,

        /// The directory where files will be extracted. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Archive password. If not provided, QCX_PASSWORD is used or the password is prompted for.
        #[arg(long)]
        password: Option<String>,

        /// Skip the CRC-32 check of extracted files.
        #[arg(long)]
        skip_check: bool,

        /// Refuse archives asking for more PBKDF2 iterations than this.
        #[arg(long, default_value_t = DEFAULT_MAX_KDF_ITERATIONS)]
        max_iterations: u32,

        /// Do not print progress messages.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Decrypt an archive and list its contents as a table.
    #[command(alias = "l")]
    List {
        /// The archive file to list contents of.
        #[arg(required = true)]
        archive: PathBuf,

        /// Archive password. If not provided, QCX_PASSWORD is used or the password is prompted for.
        #[arg(long)]
        password: Option<String>,

        /// Refuse archives asking for more PBKDF2 iterations than this.
        #[arg(long, default_value_t = DEFAULT_MAX_KDF_ITERATIONS)]
        max_iterations: u32,
    },

    /// Show the unencrypted header of an archive. No password needed.
    #[command(alias = "i")]
    Info {
        /// The archive file to inspect.
        #[arg(required = true)]
        archive: PathBuf,
    },
}

/// Gets the password from the command-line option or the `QCX_PASSWORD`
/// environment variable.
///
/// Priority:
/// 1. `--password` command-line argument.
/// 2. `QCX_PASSWORD` environment variable.
/// 3. Returns `Ok(None)` if neither is present, allowing the caller to prompt interactively.
pub fn get_password_from_opt_or_env(password_opt: Option<String>) -> Result<Option<String>, std::io::Error> {
    if let Some(pass) = password_opt {
        return Ok(Some(pass));
    }
    if let Ok(pass) = std::env::var(PASSWORD_ENV) {
        return Ok(Some(pass));
    }
    Ok(None)
}

/// Resolves the password, prompting on the terminal as a last resort.
pub fn resolve_password(password_opt: Option<String>) -> Result<String, std::io::Error> {
    match get_password_from_opt_or_env(password_opt)? {
        Some(pass) => Ok(pass),
        None => rpassword::prompt_password("Password: "),
    }
}

/// Checks the minimum length `create` enforces.
pub fn check_new_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}
