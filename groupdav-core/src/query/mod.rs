//! Calendar-query reports.

mod filter;
mod matcher;

pub use filter::{Collation, CompFilter, ParamFilter, PropFilter, TextMatch};
pub use matcher::{matches, query, time_range_query};
