//! Typed records parsed at the store boundary.
//!
//! - [`JobMeta`] - the `job:<id>:meta` hash with validated defaults

pub mod meta;

pub use meta::JobMeta;
