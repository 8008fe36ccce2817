//! HTTP boundary.
//!
//! The handlers only marshal requests and responses; all behaviour lives in
//! [`crate::pipeline::TurnPipeline`]. Error bodies carry a stable `error`
//! kind plus a human-readable detail, never upstream response bodies or
//! credentials.

pub mod routes;

pub use routes::{router, AppContext};
