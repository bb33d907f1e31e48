//! Side-effecting collaborators: config files, child processes, the device
//! driver, crash recovery and per-account storage.

pub mod config;
pub mod driver;
pub mod process;
pub mod recovery;
pub mod storage;
