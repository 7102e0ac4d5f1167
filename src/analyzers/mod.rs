//! Trip and capacity analytics.
//!
//! Everything here is a pure function of already-loaded data plus a
//! [`Calendar`](crate::calendar::Calendar); loading lives in [`crate::loader`].

pub mod capacity;
pub mod distribution;
pub mod ranking;
pub mod types;
pub mod utility;
pub mod weekly;
