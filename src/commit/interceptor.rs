use crate::catalog::schema::TableSchema;
use crate::catalog::types::Row;
use crate::error::ProvError;
use crate::identity::WriteContext;
use crate::versioning::{FamilyRegistry, VersionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
}

/// Read-only state an interceptor may consult while a write is staged.
pub struct WriteEnv<'a> {
    pub ctx: &'a WriteContext,
    pub now_micros: i64,
    pub seq: u64,
    pub families: &'a FamilyRegistry,
    pub versions: &'a VersionStore,
}

/// A row about to be written. `existing` is the stored image for updates.
pub struct PendingWrite<'a> {
    pub schema: &'a TableSchema,
    pub kind: WriteKind,
    pub existing: Option<&'a Row>,
    pub row: &'a mut Row,
}

/// Pre-commit step run on every insert and update of a domain table, inside
/// the writing transaction. Returning an error aborts the transaction.
pub trait WriteInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn before_write(&self, env: &WriteEnv<'_>, write: &mut PendingWrite<'_>)
    -> Result<(), ProvError>;
}
