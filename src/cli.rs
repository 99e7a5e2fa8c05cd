// SPDX-License-Identifier: GPL-2.0

//! Argument parsing. One flat command, no subcommands — the fan-out engine
//! has a single mode of operation, so this mirrors the teacher's per-leaf
//! `Cli` structs (e.g. `commands::fsck::FsckCli`) rather than its top-level
//! subcommand dispatcher.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use log::warn;

use crate::allocator::Mode;

const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Copy stdin to one or more output sinks, fanning out either to every
/// sink (copy mode) or splitting the stream across them (scatter mode).
#[derive(Parser, Debug)]
#[command(name = "funnel", about = "One-to-many stream fan-out (tee/scatter)")]
pub struct Cli {
    /// Block size for the internal buffer pool; accepts a plain byte count
    /// or a human suffix (k/m/g, case-insensitive).
    #[arg(short = 'b', long = "block-size", value_parser = parse_block_size, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Enable scatter mode: each byte goes to exactly one sink.
    #[arg(short = 's', long = "scatter")]
    pub scatter: bool,

    /// Enable line-aligned scatter (only meaningful together with -s).
    #[arg(short = 'l', long = "line")]
    pub line: bool,

    /// Output sink paths, in order.
    #[arg(required = true)]
    pub sinks: Vec<PathBuf>,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.line && !self.scatter {
            warn!("-l has no effect without -s; line-aligned scatter was not requested");
        }
        if self.scatter {
            Mode::Scatter { line: self.line }
        } else {
            Mode::Copy
        }
    }
}

/// Parse a byte count with an optional `k`/`m`/`g` suffix (binary units,
/// matching the buffer pool's own `1 MiB` default).
fn parse_block_size(s: &str) -> Result<usize, String> {
    parse_human_size(s).map_err(|e| e.to_string())
}

fn parse_human_size(s: &str) -> Result<usize> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("block size must not be empty"));
    }
    let (digits, mult) = match s.chars().last().unwrap().to_ascii_lowercase() {
        'k' => (&s[..s.len() - 1], 1usize << 10),
        'm' => (&s[..s.len() - 1], 1usize << 20),
        'g' => (&s[..s.len() - 1], 1usize << 30),
        _ => (s, 1usize),
    };
    let n: usize = digits
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid block size: {s:?}"))?;
    let bytes = n
        .checked_mul(mult)
        .ok_or_else(|| anyhow!("block size overflows: {s:?}"))?;
    if bytes == 0 {
        return Err(anyhow!("block size must be greater than zero: {s:?}"));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_integer() {
        assert_eq!(parse_human_size("4096").unwrap(), 4096);
    }

    #[test]
    fn parses_kilo_mega_giga_suffixes() {
        assert_eq!(parse_human_size("1k").unwrap(), 1024);
        assert_eq!(parse_human_size("2M").unwrap(), 2 << 20);
        assert_eq!(parse_human_size("1g").unwrap(), 1 << 30);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_human_size("").is_err());
        assert!(parse_human_size("abc").is_err());
        assert!(parse_human_size("12x").is_err());
    }

    #[test]
    fn rejects_zero_block_size() {
        assert!(parse_human_size("0").is_err());
        assert!(parse_human_size("0k").is_err());
    }

    #[test]
    fn mode_defaults_to_copy() {
        let cli = Cli::parse_from(["funnel", "out"]);
        assert!(matches!(cli.mode(), Mode::Copy));
    }

    #[test]
    fn mode_scatter_with_line() {
        let cli = Cli::parse_from(["funnel", "-s", "-l", "out"]);
        assert!(matches!(cli.mode(), Mode::Scatter { line: true }));
    }

    #[test]
    fn line_without_scatter_still_parses() {
        let cli = Cli::parse_from(["funnel", "-l", "out"]);
        assert!(matches!(cli.mode(), Mode::Copy));
    }

    #[test]
    fn requires_at_least_one_sink() {
        let err = Cli::try_parse_from(["funnel"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
