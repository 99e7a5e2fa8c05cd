// SPDX-License-Identifier: GPL-2.0

//! Sink table: one record per output descriptor.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// One output stream and its cursors.
pub struct Sink {
    pub name: String,
    file: File,
    pub pos_written: u64,
    pub pos_to_write: u64,
    pub active: bool,
}

impl Sink {
    pub fn open_for_path(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            name: path.display().to_string(),
            file,
            pos_written: 0,
            pos_to_write: 0,
            active: true,
        })
    }

    pub fn drained(&self) -> bool {
        self.pos_written == self.pos_to_write
    }

    pub fn pending(&self) -> bool {
        self.active && self.pos_written < self.pos_to_write
    }

    /// Write `buf`, returning the byte count on success. Broken-pipe is
    /// reported as `Ok(None)` so callers can deactivate the sink without
    /// treating it as a fatal error; every other failure is propagated.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<Option<usize>> {
        match self.file.write(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.file.as_raw_fd()
    }
}

pub struct SinkTable {
    sinks: Vec<Sink>,
}

impl SinkTable {
    pub fn open(paths: &[impl AsRef<Path>]) -> io::Result<Self> {
        let mut sinks = Vec::with_capacity(paths.len());
        for p in paths {
            let path = p.as_ref();
            let sink = Sink::open_for_path(path)
                .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
            sinks.push(sink);
        }
        Ok(Self { sinks })
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sink> {
        self.sinks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sink> {
        self.sinks.iter_mut()
    }

    pub fn get(&self, idx: usize) -> &Sink {
        &self.sinks[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Sink {
        &mut self.sinks[idx]
    }

    pub fn any_active(&self) -> bool {
        self.sinks.iter().any(|s| s.active)
    }

    /// `min(pos_written over active sinks)`, or `source_pos_read` if every
    /// sink is inactive (nothing left to bound memory residency by).
    pub fn min_active_pos_written(&self, source_pos_read: u64) -> u64 {
        self.sinks
            .iter()
            .filter(|s| s.active)
            .map(|s| s.pos_written)
            .min()
            .unwrap_or(source_pos_read)
    }
}
