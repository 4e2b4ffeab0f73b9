pub mod handlers;
pub mod judge;
pub mod runner;
pub mod system_monitor;
pub mod toolchain;
pub mod types;
pub mod utils;
pub mod workspace;
