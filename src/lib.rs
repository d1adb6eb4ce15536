//! flagcache - flag glyph substitution with a persistent asset cache
//!
//! Finds flag emoji in a document, swaps them for image placeholders and
//! resolves each distinct flag to one downloaded asset, shared across every
//! occurrence and kept on disk between sessions.

pub mod batcher;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod handle;
pub mod key;
pub mod parser;
pub mod resolver;
pub mod session;
pub mod store;

pub use error::{FlagError, FlagResult};
