//! CLI runner shared by the `qcx` binary: dispatches each subcommand to the
//! library and renders results for a terminal.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::{build_archive, write_archive_file};
use crate::cli::{self, Commands};
use crate::extract::{inspect_archive, open_archive, OpenedArchive};
use crate::format::OuterHeader;
use crate::input::read_inputs;
use crate::options::{BuildOptions, OpenOptions};
use crate::progress::{format_size, ProgressCallback, ProgressEvent};

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;

    match command {
        Commands::Create { inputs, output, password, iterations, level, note, quiet } => {
            let output = output.unwrap_or_else(|| default_output(&inputs));
            let pass = cli::resolve_password(password)?;
            cli::check_new_password(&pass)?;

            let mut options = BuildOptions::default().with_iterations(iterations).with_level(level);
            if let Some(note) = note {
                options = options.with_note(note);
            }
            let progress = progress_printer(quiet);

            let records = read_inputs(&inputs)?;
            let built = build_archive(records, &pass, &options, progress.as_deref())?;
            write_archive_file(&output, &built.bytes)?;

            println!("Created {}", output.display());
            println!("Total original size: {}", format_size(built.inner_header.total_size));
            println!("Compression ratio: {:.1}%", built.ratio);
        }
        Commands::Extract { archive, files, output, password, skip_check, max_iterations, quiet } => {
            let pass = cli::resolve_password(password)?;
            let options = OpenOptions::default().with_max_iterations(max_iterations);
            let progress = progress_printer(quiet);

            let bytes = fs::read(&archive).map_err(|e| crate::QcxError::io(e, &archive))?;
            let opened = open_archive(&bytes, &pass, &options, progress.as_deref())?;
            let indices = select_entries(&opened, &files)?;
            let out_dir = output.unwrap_or_else(|| PathBuf::from("."));
            let written = opened.extract_to(&out_dir, &indices, !skip_check)?;
            println!("Extracted {} file(s) to {}", written.len(), out_dir.display());
        }
        Commands::List { archive, password, max_iterations } => {
            let pass = cli::resolve_password(password)?;
            let options = OpenOptions::default().with_max_iterations(max_iterations);
            let bytes = fs::read(&archive).map_err(|e| crate::QcxError::io(e, &archive))?;
            let opened = open_archive(&bytes, &pass, &options, None)?;
            print_table(&opened, &mut io::stdout().lock())?;
        }
        Commands::Info { archive } => {
            let bytes = fs::read(&archive).map_err(|e| crate::QcxError::io(e, &archive))?;
            let outer = inspect_archive(&bytes)?;
            print_info(&outer, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

fn default_output(inputs: &[PathBuf]) -> PathBuf {
    let stem = inputs
        .first()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    PathBuf::from(format!("{}.qcx", stem))
}

// --- utils for CLI progress -------------------------------------------------

fn progress_printer(quiet: bool) -> Option<Arc<ProgressCallback>> {
    if quiet {
        return None;
    }
    let cb: Arc<ProgressCallback> = Arc::new(|ev: &ProgressEvent| {
        // Print to stderr to avoid interfering with stdout
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{}", ev.message);
    });
    Some(cb)
}

/// Resolves `#<index>` or stored-path selectors into entry indices.
fn select_entries(opened: &OpenedArchive, selectors: &[String]) -> Result<Vec<usize>, String> {
    let mut out = Vec::with_capacity(selectors.len());
    for sel in selectors {
        let idx = match sel.strip_prefix('#') {
            Some(num) => num
                .parse::<usize>()
                .ok()
                .filter(|i| *i < opened.entries().len())
                .ok_or_else(|| format!("no entry with index {}", sel))?,
            None => opened
                .find(sel)
                .ok_or_else(|| format!("no entry named '{}'", sel))?,
        };
        out.push(idx);
    }
    Ok(out)
}

fn print_table(opened: &OpenedArchive, out: &mut impl Write) -> io::Result<()> {
    let inner = &opened.inner_header;
    writeln!(out, "{:>4}  {:<40}  {:<24}  {:>10}  {:>8}", "#", "Path", "MIME", "Size", "CRC32")?;
    for (idx, entry) in inner.files.iter().enumerate() {
        writeln!(
            out,
            "{:>4}  {:<40}  {:<24}  {:>10}  {:>8}",
            idx,
            entry.path,
            entry.mime,
            format_size(entry.size),
            entry.crc32_hex
        )?;
    }
    writeln!(
        out,
        "{} file(s), {} original, {} after dedup",
        inner.file_count,
        format_size(inner.total_size),
        format_size(inner.unique_size)
    )
}

fn print_info(outer: &OuterHeader, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Format:     {} v{}", outer.magic, outer.version)?;
    writeln!(
        out,
        "KDF:        {} / {} ({} iterations)",
        outer.kdf.algo, outer.kdf.hash, outer.kdf.iterations
    )?;
    writeln!(out, "Cipher:     {}", outer.cipher.algo)?;
    writeln!(out, "Files:      {}", outer.meta.file_count)?;
    writeln!(out, "Total size: {}", format_size(outer.meta.total_size))?;
    if !outer.meta.note.is_empty() {
        writeln!(out, "Note:       {}", outer.meta.note)?;
    }
    Ok(())
}
