//! Package building, the registry and its reaper.

pub(crate) mod book;
pub mod engines;
pub mod error;
pub(crate) mod lock;
pub mod package;
pub mod reaper;
pub mod registry;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;
