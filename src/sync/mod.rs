//! Synchronization primitives
//!
//! Contains semaphores, mutexes, condition variables and synchronous
//! messages.

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "condvar")]
pub mod condvar;

#[cfg(feature = "msg")]
pub mod msg;
