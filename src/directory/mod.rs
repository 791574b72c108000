//! Directory data model and the abstract client capability set the core
//! depends on (§3, §6).

pub mod client;
pub mod entities;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use client::{DirectoryClient, DirectoryClientFactory};
pub use entities::{Computer, DirectoryEntity, Group, User};
