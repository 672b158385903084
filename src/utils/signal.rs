//! Signal handling utilities for graceful shutdown.

use super::shutdown::ShutdownToken;

/// Set up a Ctrl-C handler that requests shutdown on `token`.
///
/// # Example
/// ```ignore
/// let token = ShutdownToken::new();
/// setup_ctrl_c_handler(token.clone())?;
/// while !token.sleep(Duration::from_secs(1)) {
///     // ... do work ...
/// }
/// ```
pub fn setup_ctrl_c_handler(token: ShutdownToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if token.request() {
            log::info!("Received shutdown signal");
        }
    })
}
