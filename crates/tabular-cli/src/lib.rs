//! Library components of the `tabular` command line tool.

pub mod document;
pub mod logging;
pub mod report;
