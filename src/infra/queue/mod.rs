//! Job store backends.

pub mod file;
pub mod memory;

pub use file::FileJobStore;
pub use memory::InMemoryJobStore;
