//! The interpreter-facing half of the bridge: line-delimited JSON over a
//! private TCP channel to a hook inside the Vim process.

pub mod correlate;
pub mod link;
pub mod protocol;
