//! Pipeline passes, run strictly in order
//!
//! Each pass exposes its pure transform plus a `run(state, config)` adapter
//! that reads the fields of earlier passes from `AnalysisState`.

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
pub mod pass_3;
