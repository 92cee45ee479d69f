//! Directory commands understood by `mirrorctl`

use anyhow::Context;
use clap::Subcommand;
use mirrordir::{io, Directory};
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List entry names
    Ls,
    /// Print an entry to stdout
    Cat { name: String },
    /// Show size and CRC32C of an entry
    Stat { name: String },
    /// Create or replace an entry from a file, or stdin if no file is given
    Put { name: String, file: Option<PathBuf> },
    /// Delete an entry
    Rm { name: String },
    /// Rename an entry, replacing the target
    Mv { from: String, to: String },
}

/// Run `command` against `dir`, writing any output to `out`
pub async fn run<D: Directory>(dir: &D, command: &Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Ls => {
            for name in dir.list().await? {
                writeln!(out, "{name}")?;
            }
        }
        Command::Cat { name } => {
            let data = io::read_entry(dir, name).await?;
            out.write_all(&data)?;
        }
        Command::Stat { name } => {
            let data = io::read_entry(dir, name).await?;
            writeln!(
                out,
                "{name}\t{}\tcrc32c={:08x}",
                data.len(),
                crc32c::crc32c(&data)
            )?;
        }
        Command::Put { name, file } => {
            let data = match file {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                None => {
                    let mut data = Vec::new();
                    std::io::stdin().read_to_end(&mut data)?;
                    data
                }
            };
            io::write_entry(dir, name, &data).await?;
        }
        Command::Rm { name } => dir.delete(name).await?,
        Command::Mv { from, to } => dir.rename(from, to).await?,
    }
    Ok(())
}
