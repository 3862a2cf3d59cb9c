// src/lib.rs

//! Credits covered and uncovered lines to the committers who last touched
//! them, and gates a change on the resulting per-committer coverage.
//!
//! The pipeline runs in four stages: [`coverage`] builds an index of
//! coverable lines, [`blame`] resolves who owns each line through a
//! [`history::HistoryProvider`], [`aggregate`] joins the two, and [`gate`]
//! turns the aggregate into a verdict. [`pipeline::run`] wires them together.

pub mod aggregate;
pub mod blame;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod error;
pub mod gate;
pub mod git;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod renderer;

pub use error::{Error, Result};
