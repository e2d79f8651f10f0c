//! reshape core crate.
//!
//! Layers, bottom up:
//!
//! - `path`: dotted path queries and writes over JSON documents.
//! - `pivot`: column-to-row regrouping.
//! - `rules` + `getset`: the `{src, dst}` rule engine (projection, then
//!   regroup of every array key).
//! - `storage`: a document held across calls.
//! - `runtime` + `modules` + `engine`: a JSON expression runtime exposing
//!   the above as `gsjson.*` and `storage.*` operators.
//!
//! Every GetSet call is independent: no state survives between calls and no
//! global mutable state is used, so one [`Reshaper`] or [`Engine`] can serve
//! many threads.

pub mod config;
pub mod engine;
pub mod error;
pub mod getset;
mod modules;
pub mod observer;
pub mod path;
pub mod pivot;
pub mod rules;
pub mod runtime;
pub mod storage;

pub use config::{ConfigError, ReshapeConfig, WatchConfig};
pub use engine::Engine;
pub use error::ReshapeError;
pub use getset::{ReshapeOptions, Reshaper, get_set};
pub use observer::{ExecutionObserver, ExecutionRecord, TracingObserver};
pub use path::{PathError, Query, WritePath};
pub use pivot::{FanOutMismatch, FanOutPolicy, pivot};
pub use rules::{Destination, PathRule, RuleSet};
pub use runtime::{Context, EvalError, EvalResult, Operator, Operators, State, evaluate};
pub use storage::Storage;
