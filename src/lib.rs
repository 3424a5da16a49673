//! Back-coding pipeline for open-ended survey answers.
//!
//! Survey questions with an "other, please specify" box collect free text
//! that analysts need folded back into a closed code list. This crate walks
//! an uploaded table through that fold:
//!
//! ```text
//! upload -> fuzzy match -> review queue -> merge/rename/identifier -> export
//! ```
//!
//! Every cell in the tracked columns is scored against a curated vocabulary
//! with a normalized Levenshtein ratio. Confident matches go straight
//! through; the rest queue up for an operator, who picks a vocabulary entry
//! or the `unknown` sentinel. Canonicalization then applies per-domain merge
//! and rename rules and attaches numeric identifiers, and the derived
//! columns are spliced into a copy of the original table, ready for the
//! analysis tool.
//!
//! The [`session::Session`] type drives the whole flow and enforces the
//! stage order; domain settings live in a YAML registry handled by
//! [`store::UseCaseStore`].
//!
//! ```no_run
//! use backcode::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = UseCaseStore::load("config/use_cases.yaml")?;
//! let mut session = Session::new("telco", store.get("telco")?);
//! session.load_table(backcode::csv_io::read_table("answers.csv", b',')?)?;
//! session.run_matcher()?;
//! for (key, entry) in session.review_queue().iter() {
//!     println!("{}[{}]: {:?}", key.column, key.row, entry.suggested);
//! }
//! session.canonicalize()?;
//! session.assemble()?;
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod csv_io;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod review;
pub mod rules;
pub mod session;
pub mod store;
pub mod table;

/// The types most callers need.
pub mod prelude {
    pub use crate::canonical::{Canonicalizer, EnrichedColumn, EnrichedRow};
    pub use crate::error::{BackcodeError, ConfigError, InputError, PipelineWarning};
    pub use crate::matcher::{ClassifiedColumn, ClassifiedRow, FuzzyMatcher, DEFAULT_THRESHOLD};
    pub use crate::review::{ReviewQueue, RowKey, UNKNOWN_LABEL};
    pub use crate::rules::{AliasTable, IdentifierTable};
    pub use crate::session::{Session, SessionState};
    pub use crate::store::{UseCase, UseCaseStore};
    pub use crate::table::Table;
}
