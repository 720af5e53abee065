//! Process-wide logging setup shared by the wallet binaries and tests.

pub mod tracing;

/// Initialize logging for the process. Idempotent.
pub fn init() {
    tracing::init();
}
