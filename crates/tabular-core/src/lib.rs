//! Change propagation engine for the tabular metadata graph.
//!
//! A [`Session`] holds one loaded model. Every mutation runs through the
//! same pipeline: validation and veto, commit, undo record, dependency and
//! rename fix-up, error cascade and presentation tree sync.

pub mod capability;
mod cascade;
mod delete;
pub mod dependency;
pub mod expression;
mod factory;
mod fixup;
pub mod governance;
pub mod mutation;
mod query;
mod references;
pub mod schema;
mod security;
pub mod session;
pub mod tree;
pub mod undo;

pub use capability::carries;
pub use dependency::{DependencyIndex, EdgeDelta};
pub use expression::{
    DaxExpressionService, ExpressionReference, ExpressionService, Identifier, ValidationStatus,
    apply_edits, lex,
};
pub use governance::{AllowAll, DenyKinds, Governance};
pub use mutation::{ChangeListener, ChangeVerdict, PendingChange};
pub use schema::{SchemaError, SchemaSource, SourceColumn};
pub use session::{Session, Transaction};
pub use tree::{NullTree, RecordingTree, TreeNode, TreeNotification, TreeSync, ViewTree};
pub use undo::{Replay, UndoBatch, UndoLedger, UndoRecord};
