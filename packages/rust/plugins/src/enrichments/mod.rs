//! Built-in enrichments.

mod hash;
mod page_meta;

pub use hash::HashEnricher;
pub use page_meta::PageMetaEnricher;
