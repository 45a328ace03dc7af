//! Component trees and the expression sandbox
//!
//! User-authored values and conditions are described as [`Component`] trees
//! and evaluated against an [`flowcore::ExecutionData`] by a
//! [`ComponentEvaluator`]. Script leaves run inside the rhai-backed
//! [`Sandbox`], one fresh scope per evaluation.

mod compare;
mod component;
mod error;
mod sandbox;

pub use compare::{loose_eq, to_number, CompareOp};
pub use component::{Component, ComponentEvaluator};
pub use error::{EvalError, SandboxError};
pub use sandbox::{Sandbox, SandboxConfig, Session};
