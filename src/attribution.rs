//! Row attribution: the four created/updated columns every attributed table
//! carries, maintained on the write path and never taken from the caller.

use crate::catalog::schema::{CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY};
use crate::catalog::types::{Row, Value};
use crate::commit::interceptor::{PendingWrite, WriteEnv, WriteInterceptor, WriteKind};
use crate::directory::ActorId;
use crate::error::ProvError;

/// Attribution read back from a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution {
    pub created_at_micros: i64,
    pub created_by: ActorId,
    pub updated_at_micros: i64,
    pub updated_by: ActorId,
}

impl Attribution {
    pub fn from_row(row: &Row) -> Option<Self> {
        let actor = |column| {
            row.get(column)
                .and_then(Value::as_u64)
        };
        let ts = |column| match row.get(column) {
            Some(Value::Timestamp(v)) => Some(*v),
            _ => None,
        };
        Some(Self {
            created_at_micros: ts(CREATED_AT)?,
            created_by: actor(CREATED_BY)?,
            updated_at_micros: ts(UPDATED_AT)?,
            updated_by: actor(UPDATED_BY)?,
        })
    }
}

pub fn stamp_insert(row: &mut Row, actor_id: ActorId, now_micros: i64) -> Result<(), ProvError> {
    let actor = actor_value(actor_id)?;
    row.set(CREATED_AT, Value::Timestamp(now_micros));
    row.set(CREATED_BY, actor.clone());
    row.set(UPDATED_AT, Value::Timestamp(now_micros));
    row.set(UPDATED_BY, actor);
    Ok(())
}

pub fn stamp_update(
    existing: &Row,
    row: &mut Row,
    actor_id: ActorId,
    now_micros: i64,
) -> Result<(), ProvError> {
    for column in [CREATED_AT, CREATED_BY] {
        let stored = existing.get(column).cloned().unwrap_or(Value::Null);
        row.set(column, stored);
    }
    row.set(UPDATED_AT, Value::Timestamp(now_micros));
    row.set(UPDATED_BY, actor_value(actor_id)?);
    Ok(())
}

fn actor_value(actor_id: ActorId) -> Result<Value, ProvError> {
    i64::try_from(actor_id)
        .map(Value::Integer)
        .map_err(|_| ProvError::Validation(format!("actor id {actor_id} out of range")))
}

/// Mandatory interceptor. Runs last so nothing after it can rewrite
/// attribution.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributionStamp;

impl WriteInterceptor for AttributionStamp {
    fn name(&self) -> &'static str {
        "attribution_stamp"
    }

    fn before_write(
        &self,
        env: &WriteEnv<'_>,
        write: &mut PendingWrite<'_>,
    ) -> Result<(), ProvError> {
        if !write.schema.attributed {
            return Ok(());
        }
        let actor_id = env.ctx.actor_id();
        match (write.kind, write.existing) {
            (WriteKind::Insert, _) => stamp_insert(write.row, actor_id, env.now_micros),
            (WriteKind::Update, Some(existing)) => {
                stamp_update(existing, write.row, actor_id, env.now_micros)
            }
            (WriteKind::Update, None) => Err(ProvError::IntegrityError {
                message: format!(
                    "update on '{}' staged without the stored row",
                    write.schema.table_name
                ),
            }),
        }
    }
}
