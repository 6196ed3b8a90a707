//! Versioned sources and revision resolution for revbench.
//!
//! A project declares sources; each source offers versions. A revision picks
//! one version per source, and the set of revisions to test is the cross
//! product of the context-free sources, widened by the context-aware ones.

#![warn(missing_docs)]

mod error;
mod variant;
mod revision;

// Resolution
mod product;
mod select;
mod filter;

// Concrete sources
mod lock;
mod git;
mod http;
mod list;

pub use error::{Result, SourceError};
pub use variant::{Remote, Source, SourceRef, Variant, Version};
pub use revision::Revision;

pub use product::{expand_with_context, resolve, Product};
pub use select::select;
pub use filter::SingleVersionFilter;

pub use lock::CacheLock;
pub use git::{Git, ABBREV_LEN};
pub use http::Http;
pub use list::{Conditional, List};
