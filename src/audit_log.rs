use crate::catalog::types::{Row, Value};
use crate::directory::ActorId;
use im::Vector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type AuditEntryId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOperation::Insert => "insert",
            AuditOperation::Update => "update",
            AuditOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

pub type FieldDiff = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub table_name: String,
    pub operation: AuditOperation,
    pub primary_key: Vec<Value>,
    pub diff: FieldDiff,
    pub actor_id: ActorId,
    pub recorded_at_micros: i64,
    pub seq: u64,
}

/// Filter for audit log reads. Time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLogQuery {
    pub table_name: Option<String>,
    pub actor_id: Option<ActorId>,
    pub since_micros: Option<i64>,
    pub until_micros: Option<i64>,
    pub limit: Option<usize>,
}

impl AuditLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn since(mut self, micros: i64) -> Self {
        self.since_micros = Some(micros);
        self
    }

    pub fn until(mut self, micros: i64) -> Self {
        self.until_micros = Some(micros);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.table_name
            .as_deref()
            .map(|t| t == entry.table_name)
            .unwrap_or(true)
            && self.actor_id.map(|a| a == entry.actor_id).unwrap_or(true)
            && self
                .since_micros
                .map(|s| entry.recorded_at_micros >= s)
                .unwrap_or(true)
            && self
                .until_micros
                .map(|u| entry.recorded_at_micros <= u)
                .unwrap_or(true)
    }
}

/// Append-only change ledger for tables enrolled with `audited = true`.
///
/// Entries are appended in commit order with strictly increasing timestamps,
/// so storage order is timestamp order. Nothing here edits an entry; the only
/// removal path is `purge_before`, reached through the administrative purge on
/// `ProvDb`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLog {
    entries: Vector<AuditLogEntry>,
    next_id: AuditEntryId,
}

impl AuditLog {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record_change(
        &mut self,
        table_name: &str,
        operation: AuditOperation,
        actor_id: ActorId,
        primary_key: Vec<Value>,
        diff: FieldDiff,
        recorded_at_micros: i64,
        seq: u64,
    ) -> AuditEntryId {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(AuditLogEntry {
            id,
            table_name: table_name.to_string(),
            operation,
            primary_key,
            diff,
            actor_id,
            recorded_at_micros,
            seq,
        });
        id
    }

    /// Oldest first. `max_rows` caps the result when the query sets no limit.
    pub fn query(&self, query: &AuditLogQuery, max_rows: usize) -> Vec<AuditLogEntry> {
        let limit = query.limit.unwrap_or(max_rows).min(max_rows);
        self.entries
            .iter()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Removes entries recorded strictly before `cutoff_micros`.
    pub(crate) fn purge_before(&mut self, cutoff_micros: i64) -> usize {
        let keep_from = self
            .entries
            .iter()
            .position(|e| e.recorded_at_micros >= cutoff_micros)
            .unwrap_or(self.entries.len());
        if keep_from == 0 {
            return 0;
        }
        self.entries = self.entries.skip(keep_from);
        keep_from
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Field-level diff between two row images. Inserts and deletes list every
/// column; updates list changed columns only.
pub fn diff_rows(old: Option<&Row>, new: Option<&Row>) -> FieldDiff {
    let mut diff = FieldDiff::new();
    match (old, new) {
        (None, None) => {}
        (None, Some(new)) => {
            for (column, value) in &new.values {
                diff.insert(
                    column.clone(),
                    FieldChange {
                        old: None,
                        new: Some(value.clone()),
                    },
                );
            }
        }
        (Some(old), None) => {
            for (column, value) in &old.values {
                diff.insert(
                    column.clone(),
                    FieldChange {
                        old: Some(value.clone()),
                        new: None,
                    },
                );
            }
        }
        (Some(old), Some(new)) => {
            for (column, new_value) in &new.values {
                let old_value = old.values.get(column);
                if old_value != Some(new_value) {
                    diff.insert(
                        column.clone(),
                        FieldChange {
                            old: old_value.cloned(),
                            new: Some(new_value.clone()),
                        },
                    );
                }
            }
            for (column, old_value) in &old.values {
                if !new.values.contains_key(column) {
                    diff.insert(
                        column.clone(),
                        FieldChange {
                            old: Some(old_value.clone()),
                            new: None,
                        },
                    );
                }
            }
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::{AuditLog, AuditLogQuery, AuditOperation, diff_rows};
    use crate::catalog::types::{Row, Value};

    fn log_with_entries() -> AuditLog {
        let mut log = AuditLog::default();
        for (i, (table, actor)) in [
            ("scenario.run", 2),
            ("scenario.run", 3),
            ("network.link", 2),
            ("scenario.run", 2),
        ]
        .into_iter()
        .enumerate()
        {
            let ts = (i as i64 + 1) * 100;
            log.record_change(
                table,
                AuditOperation::Insert,
                actor,
                vec![Value::Integer(i as i64)],
                diff_rows(None, Some(&Row::new().with("id", i as i64))),
                ts,
                i as u64 + 1,
            );
        }
        log
    }

    #[test]
    fn query_filters_by_table_actor_and_time() {
        let log = log_with_entries();
        let by_table = log.query(&AuditLogQuery::new().table("scenario.run"), 100);
        assert_eq!(by_table.len(), 3);
        let by_actor = log.query(&AuditLogQuery::new().table("scenario.run").actor(2), 100);
        assert_eq!(
            by_actor.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![1, 4]
        );
        let window = log.query(&AuditLogQuery::new().since(200).until(300), 100);
        assert_eq!(window.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3]);
        let limited = log.query(&AuditLogQuery::new().limit(10), 2);
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn recent_is_newest_first() {
        let log = log_with_entries();
        let recent = log.recent(2);
        assert_eq!(recent.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 3]);
    }

    #[test]
    fn purge_removes_only_older_entries() {
        let mut log = log_with_entries();
        assert_eq!(log.purge_before(300), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.purge_before(0), 0);
        let next = log.record_change(
            "network.link",
            AuditOperation::Delete,
            2,
            vec![],
            Default::default(),
            500,
            5,
        );
        assert_eq!(next, 5, "ids are never reused after a purge");
    }

    #[test]
    fn update_diff_lists_changed_columns_only() {
        let old = Row::new().with("id", 1).with("name", "Mead").with("capacity", 10);
        let new = Row::new().with("id", 1).with("name", "Mead").with("capacity", 12);
        let diff = diff_rows(Some(&old), Some(&new));
        assert_eq!(diff.len(), 1);
        let change = diff.get("capacity").expect("capacity change");
        assert_eq!(change.old, Some(Value::Integer(10)));
        assert_eq!(change.new, Some(Value::Integer(12)));
    }

    #[test]
    fn delete_diff_lists_all_old_columns() {
        let old = Row::new().with("id", 1).with("name", "Mead");
        let diff = diff_rows(Some(&old), None);
        assert_eq!(diff.len(), 2);
        assert!(diff.values().all(|c| c.new.is_none()));
    }
}
