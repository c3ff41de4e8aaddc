//! Collection specifications: which files make up a collection, where they live, and how
//! their names encode dates.

mod date;
mod error;
mod matcher;
mod scan;
mod spec;

pub use crate::date::DateExtractor;
pub use crate::error::{CollectionSpecError, Result};
pub use crate::matcher::PathMatcher;
pub use crate::scan::scan_collection;
pub use crate::spec::{CollectionSpec, DEFAULT_DELIMITER};
