// Emulator threading layer
// Portable threads, locks, semaphores and bounded event queues.

pub mod cli;
pub mod config;
pub mod ffi;
pub mod harness;
pub mod logging;
pub mod threading;

pub use config::ThreadConfig;
pub use logging::LogLevel;
pub use threading::{
    EmuMutex, EventQueue, Semaphore, ThreadError, WorkerContext, WorkerRegistry,
};
