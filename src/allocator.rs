// SPDX-License-Identifier: GPL-2.0

//! Decides, once per loop iteration, how much newly read data each idle
//! sink is responsible for.

use crate::error::EngineError;
use crate::pool::Pool;
use crate::sink::SinkTable;

#[derive(Clone, Copy, Debug)]
pub enum Mode {
    Copy,
    Scatter { line: bool },
}

/// Run the allocator for one loop iteration. `ready` is indexed the same as
/// the sink table and reflects which descriptors the multiplexer reported
/// writable this round.
pub fn allocate(
    sinks: &mut SinkTable,
    pool: &Pool,
    source_pos_read: u64,
    mode: Mode,
    ready: &[bool],
) -> Result<(), EngineError> {
    match mode {
        Mode::Copy => {
            for sink in sinks.iter_mut() {
                sink.pos_to_write = source_pos_read;
            }
            Ok(())
        }
        Mode::Scatter { line } => allocate_scatter(sinks, pool, source_pos_read, line, ready),
    }
}

fn allocate_scatter(
    sinks: &mut SinkTable,
    pool: &Pool,
    source_pos_read: u64,
    line: bool,
    ready: &[bool],
) -> Result<(), EngineError> {
    let mut pos_assigned = sinks.iter().map(|s| s.pos_to_write).max().unwrap_or(0);

    let drained_ready: Vec<usize> = (0..sinks.len())
        .filter(|&i| {
            let s = sinks.get(i);
            ready.get(i).copied().unwrap_or(false) && s.active && s.drained()
        })
        .collect();

    if drained_ready.is_empty() {
        return Ok(());
    }

    let available_data = source_pos_read - pos_assigned;
    let available_sinks = drained_ready.len() as u64;
    let data_per_sink = available_data / available_sinks;
    let remainder = available_data % available_sinks;
    let block_size = pool.block_size() as u64;

    for (visit, &i) in drained_ready.iter().enumerate() {
        let share = if visit == 0 { data_per_sink + remainder } else { data_per_sink };
        let start = pos_assigned;
        // Per spec step 5, pos_written is raised to pos_assigned for every
        // sink visited, whether or not it ends up receiving a share this
        // round; otherwise a deferred sink keeps a stale pos_written and its
        // [pos_written, pos_to_write) window overlaps whatever the next sink
        // gets allocated.
        sinks.get_mut(i).pos_written = start;
        let mut end = start + share;

        if line && share > 0 {
            end = if available_data > block_size / 2 {
                line_boundary_dense(pool, &sinks.get(i).name, start, end)?
            } else {
                match line_boundary_sparse(pool, start, source_pos_read, data_per_sink) {
                    Some(e) => e,
                    None => {
                        // Not enough input has arrived to find a boundary for
                        // this sink yet; defer it and stop allocating.
                        sinks.get_mut(i).pos_to_write = start;
                        return Ok(());
                    }
                }
            };
        }

        let sink = sinks.get_mut(i);
        sink.pos_to_write = end;
        pos_assigned = end;
    }

    Ok(())
}

/// Dense regime: tentative boundary at the end of the share, scanned
/// backward for a newline. Safe only when lines are short relative to the
/// block size; fatal if none is found within the sink's own share.
fn line_boundary_dense(
    pool: &Pool,
    sink_name: &str,
    start: u64,
    end: u64,
) -> Result<u64, EngineError> {
    let mut p = end - 1;
    loop {
        if pool.byte_at(p) == b'\n' {
            return Ok(p + 1);
        }
        if p == start {
            return Err(EngineError::LineBoundary { sink: sink_name.to_string() });
        }
        p -= 1;
    }
}

/// Sparse regime: scan forward tracking the last newline seen. Returns
/// `None` when no newline at all was found before `source_pos_read`,
/// signalling the caller should defer this sink rather than fail.
fn line_boundary_sparse(
    pool: &Pool,
    start: u64,
    source_pos_read: u64,
    data_per_sink: u64,
) -> Option<u64> {
    let mut last_newline = None;
    let mut p = start;
    while p < source_pos_read {
        if pool.byte_at(p) == b'\n' {
            last_newline = Some(p);
            let accumulated = p - start + 1;
            if accumulated > data_per_sink {
                return Some(p + 1);
            }
        }
        p += 1;
    }
    last_newline.map(|n| n + 1)
}
