//! Ballot store and vote tally engine for multi-level electoral results:
//! quick counts, geography- and district-filtered tallies, registration
//! progress, heat maps and system statistics.
//!
//! The crate holds the data model, the ballot/reference store seams with
//! their in-memory implementations, and the aggregation engine. Ingestion
//! of ballot artifacts lives in the `actacount` binary crate on top of
//! this one.

mod model;
mod results;
mod store;

pub use crate::model::*;
pub use crate::results::*;
pub use crate::store::*;
