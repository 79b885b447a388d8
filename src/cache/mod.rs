//! Local document cache
//!
//! Fetched documents are kept on disk, one file per URL, in a small
//! versioned binary format (see [`entry`]). Reads follow stale-while-revalidate:
//!
//! | Local entry | Result | Side effect |
//! |-------------|--------|-------------|
//! | Missing or unreadable | fetched bytes | entry written |
//! | Fresh | stored bytes | none |
//! | Stale (age >= TTL) | stored bytes | background refresh queued |

pub mod entry;
pub mod store;

pub use entry::EntryError;
pub use store::{file_name_for, CacheEntryInfo, CacheOptions, CacheStore};
