// crates: interlink
// ============================================================================
// Module: Interlink rule engine
// Description: Line-oriented rule language for reconciling asset group,
//              owner, and RRA-to-service-group relationships.
// Dependencies: crate::store, crate::op_context, regex (via SQLite REGEXP)
// ============================================================================

//! ## Overview
//!
//! An interlink rule file is a flat list of directives, one per line,
//! that describe how hosts and websites should be grouped and owned.
//! Loading a file is all-or-nothing: the first line that doesn't match a
//! known shape fails the entire load, so a typo in line 40 can never
//! silently apply lines 1-39 and skip the rest.
//!
//! ### Grammar (informal)
//! - `add assetgroup <name>`
//! - `add owner <operator> <team>`
//! - `host matches <regex> link assetgroup <name>`
//! - `website matches <regex> link assetgroup <name>`
//! - `host matches <regex> ownership <operator> <team> [<triage-key-override>]`
//! - `assetgroup matches <name-regex> link service <service-regex>`
//!
//! Blank lines and lines starting with `#` are comments.

mod parser;
mod engine;

pub use engine::run_rules;
pub use parser::{parse_rules, InterlinkRule, ParseError};
