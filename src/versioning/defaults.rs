use crate::commit::interceptor::{PendingWrite, WriteEnv, WriteInterceptor, WriteKind};
use crate::catalog::types::Value;
use crate::error::ProvError;
use tracing::debug;

/// Fills version-id columns declared with `ColumnDefault::ActiveVersion` on
/// insert: a pin carried by the write context wins, otherwise the family's
/// active version. A family with no active version fails the write.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveVersionDefaults;

impl WriteInterceptor for ActiveVersionDefaults {
    fn name(&self) -> &'static str {
        "active_version_defaults"
    }

    fn before_write(
        &self,
        env: &WriteEnv<'_>,
        write: &mut PendingWrite<'_>,
    ) -> Result<(), ProvError> {
        if write.kind != WriteKind::Insert {
            return Ok(());
        }
        for column in &write.schema.columns {
            let Some(family_code) = column.active_version_family() else {
                continue;
            };
            let supplied = write.row.get(&column.name).map(|v| !v.is_null()).unwrap_or(false);
            if supplied {
                continue;
            }
            let family = env.families.require_by_code(family_code)?;
            let version_id = match env.ctx.pin_for(family_code) {
                Some(pin) => {
                    if pin.family_id != family.id {
                        return Err(ProvError::Validation(format!(
                            "version pin for '{family_code}' names family {}, expected {}",
                            pin.family_id, family.id
                        )));
                    }
                    pin.version_id
                }
                None => {
                    env.versions
                        .active_for(family.id)
                        .ok_or_else(|| ProvError::NoActiveVersion {
                            family: family_code.to_string(),
                        })?
                        .id
                }
            };
            let value = i64::try_from(version_id).map_err(|_| {
                ProvError::Validation(format!("version id {version_id} out of range"))
            })?;
            debug!(
                table = write.schema.table_name.as_str(),
                column = column.name.as_str(),
                version_id,
                "stamped version column"
            );
            write.row.set(column.name.clone(), Value::Integer(value));
        }
        Ok(())
    }
}
