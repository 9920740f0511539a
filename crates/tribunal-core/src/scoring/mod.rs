//! Judge response scoring.
//!
//! Judge responses are free text. The only part Tribunal reads is the set of
//! score markers defined by the versioned grammar in [`grammar`]; everything
//! else is kept verbatim for the audit trail.

pub mod grammar;
mod parser;

pub use grammar::GRAMMAR_VERSION;
pub use parser::ScoringParser;
