//! Request hardening: identifier validation ahead of any remote call.

mod identifiers;

pub use identifiers::{parse_qualified_name, validate_identifier, validate_table_name};
