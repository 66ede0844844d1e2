#[macro_use]
pub mod macros;
pub mod common;
pub mod context;
pub mod core_handlers;
pub mod dispatch;
pub mod fs;
pub mod handlers;
pub mod memory_handlers;
pub mod net_handlers;
pub mod process_handlers;
pub mod signal;
#[cfg(feature = "itests")]
pub mod tests;
pub mod ui_handlers;

pub use dispatch::syscall_handle;
