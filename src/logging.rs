// SPDX-License-Identifier: GPL-2.0

//! Logging setup. Separated out so `main` stays a thin dispatcher, matching
//! how the rest of this binary keeps each concern in its own module.

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `warn` so a
/// default invocation stays quiet and only allocator/sink diagnostics show
/// up when a user opts in with `RUST_LOG=debug`.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
}
