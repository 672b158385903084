//! Utility modules.

pub mod shutdown;
pub mod signal;

pub use shutdown::ShutdownToken;
pub use signal::setup_ctrl_c_handler;
