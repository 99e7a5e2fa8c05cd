// SPDX-License-Identifier: GPL-2.0

//! The I/O loop: a single-threaded, readiness-based multiplexer that drives
//! the reader and the sink writers, preferring writes over reads so the
//! buffer pool never grows past what the slowest sink needs.

use std::io::{self, Read};
use std::os::unix::io::AsRawFd;

use log::{debug, info};
use rustix::event::{poll, PollFd, PollFlags};
use rustix::fd::BorrowedFd;

use crate::allocator::{self, Mode};
use crate::error::EngineError;
use crate::pool::Pool;
use crate::sink::SinkTable;

pub struct Engine<R> {
    pool: Pool,
    sinks: SinkTable,
    mode: Mode,
    reader: R,
    source_pos_read: u64,
    reached_eof: bool,
}

impl<R: Read + AsRawFd> Engine<R> {
    pub fn new(reader: R, sinks: SinkTable, mode: Mode, block_size: usize) -> Self {
        Self {
            pool: Pool::new(block_size),
            sinks,
            mode,
            reader,
            source_pos_read: 0,
            reached_eof: false,
        }
    }

    /// Drive the engine to completion. Returns `Ok(())` on clean end of
    /// input with all writes drained (or no sink left active); any other
    /// outcome is a fatal `EngineError`.
    pub fn run(mut self) -> Result<(), EngineError> {
        set_nonblocking(self.reader.as_raw_fd()).map_err(EngineError::Read)?;
        for sink in self.sinks.iter() {
            set_nonblocking(sink.as_raw_fd()).map_err(|e| EngineError::Write {
                sink: sink.name.clone(),
                source: e,
            })?;
        }

        loop {
            let any_pending = self.sinks.iter().any(|s| s.pending());
            if self.reached_eof && !any_pending {
                debug!("input exhausted and every sink drained, exiting");
                return Ok(());
            }
            if !self.sinks.any_active() {
                info!("no active sinks remain, terminating as if input were exhausted");
                return Ok(());
            }

            let want_read = !self.reached_eof;
            let writable_request: Vec<bool> = self
                .sinks
                .iter()
                .map(|s| s.active && s.pos_written < self.source_pos_read)
                .collect();

            let reader_fd = self.reader.as_raw_fd();
            // SAFETY: `reader_fd` and each sink fd outlive this poll() call,
            // which does not retain the BorrowedFds past its own return.
            let reader_borrowed = unsafe { BorrowedFd::borrow_raw(reader_fd) };
            let sink_fds: Vec<_> =
                self.sinks.iter().map(|s| unsafe { BorrowedFd::borrow_raw(s.as_raw_fd()) }).collect();

            let mut pollfds: Vec<PollFd> = Vec::with_capacity(1 + sink_fds.len());
            if want_read {
                pollfds.push(PollFd::new(&reader_borrowed, PollFlags::IN));
            }
            for (i, want) in writable_request.iter().enumerate() {
                if *want {
                    pollfds.push(PollFd::new(&sink_fds[i], PollFlags::OUT));
                }
            }

            loop {
                match poll(&mut pollfds, -1) {
                    Ok(_) => break,
                    Err(rustix::io::Errno::INTR) => continue,
                    Err(e) => return Err(EngineError::Poll(e.into())),
                }
            }

            // Unpack poll results back into per-sink readiness, in the same
            // order the descriptors were pushed.
            let mut idx = 0;
            let reader_ready = if want_read {
                let r = pollfds[idx].revents().contains(PollFlags::IN);
                idx += 1;
                r
            } else {
                false
            };
            let mut writer_ready = vec![false; self.sinks.len()];
            for (i, want) in writable_request.iter().enumerate() {
                if *want {
                    writer_ready[i] = pollfds[idx].revents().contains(PollFlags::OUT);
                    idx += 1;
                }
            }

            let wrote = self.writer_phase(&writer_ready)?;
            if wrote > 0 {
                continue;
            }
            if reader_ready {
                self.reader_phase()?;
            }
        }
    }

    fn writer_phase(&mut self, ready: &[bool]) -> Result<u64, EngineError> {
        allocator::allocate(&mut self.sinks, &self.pool, self.source_pos_read, self.mode, ready)?;

        let mut progress = 0u64;
        for i in 0..self.sinks.len() {
            if !ready.get(i).copied().unwrap_or(false) {
                continue;
            }
            let sink = self.sinks.get(i);
            if !sink.active || sink.pos_written >= sink.pos_to_write {
                continue;
            }
            let buf = self
                .pool
                .sink_buffer(sink.pos_written, sink.pos_to_write)
                .to_vec();

            let sink = self.sinks.get_mut(i);
            match sink.write(&buf) {
                Ok(Some(n)) => {
                    sink.pos_written += n as u64;
                    progress += n as u64;
                    debug!("sink {:?}: wrote {} bytes, pos_written={}", sink.name, n, sink.pos_written);
                }
                Ok(None) => {
                    let delivered = sink.pos_written;
                    sink.active = false;
                    info!("sink {:?}: broken pipe after {} bytes, deactivating", sink.name, delivered);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(source) => {
                    return Err(EngineError::Write { sink: sink.name.clone(), source });
                }
            }
        }

        let min_pos = self.sinks.min_active_pos_written(self.source_pos_read);
        self.pool.memory_free(min_pos);
        Ok(progress)
    }

    fn reader_phase(&mut self) -> Result<(), EngineError> {
        let buf = self.pool.source_buffer(self.source_pos_read)?;
        match self.reader.read(buf) {
            Ok(0) => {
                self.reached_eof = true;
                debug!("input reached EOF at offset {}", self.source_pos_read);
            }
            Ok(n) => {
                self.source_pos_read += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(EngineError::Read(e)),
        }
        Ok(())
    }
}

fn set_nonblocking(fd: std::os::unix::io::RawFd) -> io::Result<()> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let flags = rustix::fs::fcntl_getfl(borrowed).map_err(io::Error::from)?;
    rustix::fs::fcntl_setfl(borrowed, flags | rustix::fs::OFlags::NONBLOCK)
        .map_err(io::Error::from)?;
    Ok(())
}

/// Install the one-line SIGPIPE mask needed so a closed sink never kills the
/// process via signal; write errors are inspected explicitly instead.
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    debug!("SIGPIPE ignored; broken-pipe writes are handled per-sink");
}
