//! Job row operations, split read/write like the rest of the store.

pub mod read;
pub mod write;
