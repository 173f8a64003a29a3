use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Actor,
    Family,
    Version,
    Table,
    Row,
    MapEntry,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Actor => write!(f, "actor"),
            ResourceType::Family => write!(f, "version family"),
            ResourceType::Version => write!(f, "version"),
            ResourceType::Table => write!(f, "table"),
            ResourceType::Row => write!(f, "row"),
            ResourceType::MapEntry => write!(f, "domain map entry"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    IntegrityError,
    UnresolvedActor,
    NoActiveVersion,
    ConflictingActivation,
    UnmappedTable,
    ActorAlreadyExists,
    FamilyAlreadyExists,
    VersionAlreadyExists,
    TableAlreadyExists,
    RowAlreadyExists,
    MapEntryAlreadyExists,
    ActorNotFound,
    FamilyNotFound,
    VersionNotFound,
    TableNotFound,
    RowNotFound,
    MapEntryNotFound,
    DuplicatePrimaryKey,
    UnknownColumn,
    TypeMismatch,
    NotNullViolation,
    ForeignKeyViolation,
    PermissionDenied,
}

impl ProvErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvErrorCode::Io => "io",
            ProvErrorCode::Encode => "encode",
            ProvErrorCode::Decode => "decode",
            ProvErrorCode::Validation => "validation",
            ProvErrorCode::InvalidConfig => "invalid_config",
            ProvErrorCode::IntegrityError => "integrity_error",
            ProvErrorCode::UnresolvedActor => "unresolved_actor",
            ProvErrorCode::NoActiveVersion => "no_active_version",
            ProvErrorCode::ConflictingActivation => "conflicting_activation",
            ProvErrorCode::UnmappedTable => "unmapped_table",
            ProvErrorCode::ActorAlreadyExists => "actor_already_exists",
            ProvErrorCode::FamilyAlreadyExists => "family_already_exists",
            ProvErrorCode::VersionAlreadyExists => "version_already_exists",
            ProvErrorCode::TableAlreadyExists => "table_already_exists",
            ProvErrorCode::RowAlreadyExists => "row_already_exists",
            ProvErrorCode::MapEntryAlreadyExists => "map_entry_already_exists",
            ProvErrorCode::ActorNotFound => "actor_not_found",
            ProvErrorCode::FamilyNotFound => "family_not_found",
            ProvErrorCode::VersionNotFound => "version_not_found",
            ProvErrorCode::TableNotFound => "table_not_found",
            ProvErrorCode::RowNotFound => "row_not_found",
            ProvErrorCode::MapEntryNotFound => "map_entry_not_found",
            ProvErrorCode::DuplicatePrimaryKey => "duplicate_primary_key",
            ProvErrorCode::UnknownColumn => "unknown_column",
            ProvErrorCode::TypeMismatch => "type_mismatch",
            ProvErrorCode::NotNullViolation => "not_null_violation",
            ProvErrorCode::ForeignKeyViolation => "foreign_key_violation",
            ProvErrorCode::PermissionDenied => "permission_denied",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("integrity error: {message}")]
    IntegrityError { message: String },
    #[error(
        "identity '{identity}' does not resolve to a registered actor; register this identity before writing"
    )]
    UnresolvedActor { identity: String },
    #[error("version family '{family}' has no active version; activate one before writing")]
    NoActiveVersion { family: String },
    #[error(
        "conflicting activation in family '{family}': expected active {expected:?}, found {actual:?}"
    )]
    ConflictingActivation {
        family: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("table '{table}' carries a version column but is not in the domain map")]
    UnmappedTable { table: String },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("duplicate primary key in table '{table}': {key}")]
    DuplicatePK { table: String, key: String },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error(
        "type mismatch: column '{column}' in table '{table}' expected {expected}, got {actual}"
    )]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    #[error("NOT NULL violation: column '{column}' in table '{table}'")]
    NotNullViolation { table: String, column: String },
    #[error("foreign key violation: {table}.{column} references missing {reference}")]
    ForeignKeyViolation {
        table: String,
        column: String,
        reference: String,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl ProvError {
    pub fn not_found(resource_type: ResourceType, resource_id: impl ToString) -> Self {
        ProvError::NotFound {
            resource_type,
            resource_id: resource_id.to_string(),
        }
    }

    pub fn already_exists(resource_type: ResourceType, resource_id: impl ToString) -> Self {
        ProvError::AlreadyExists {
            resource_type,
            resource_id: resource_id.to_string(),
        }
    }

    pub fn code(&self) -> ProvErrorCode {
        match self {
            ProvError::Io(_) => ProvErrorCode::Io,
            ProvError::Encode(_) => ProvErrorCode::Encode,
            ProvError::Decode(_) => ProvErrorCode::Decode,
            ProvError::Validation(_) => ProvErrorCode::Validation,
            ProvError::InvalidConfig { .. } => ProvErrorCode::InvalidConfig,
            ProvError::IntegrityError { .. } => ProvErrorCode::IntegrityError,
            ProvError::UnresolvedActor { .. } => ProvErrorCode::UnresolvedActor,
            ProvError::NoActiveVersion { .. } => ProvErrorCode::NoActiveVersion,
            ProvError::ConflictingActivation { .. } => ProvErrorCode::ConflictingActivation,
            ProvError::UnmappedTable { .. } => ProvErrorCode::UnmappedTable,
            ProvError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Actor => ProvErrorCode::ActorAlreadyExists,
                ResourceType::Family => ProvErrorCode::FamilyAlreadyExists,
                ResourceType::Version => ProvErrorCode::VersionAlreadyExists,
                ResourceType::Table => ProvErrorCode::TableAlreadyExists,
                ResourceType::Row => ProvErrorCode::RowAlreadyExists,
                ResourceType::MapEntry => ProvErrorCode::MapEntryAlreadyExists,
            },
            ProvError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Actor => ProvErrorCode::ActorNotFound,
                ResourceType::Family => ProvErrorCode::FamilyNotFound,
                ResourceType::Version => ProvErrorCode::VersionNotFound,
                ResourceType::Table => ProvErrorCode::TableNotFound,
                ResourceType::Row => ProvErrorCode::RowNotFound,
                ResourceType::MapEntry => ProvErrorCode::MapEntryNotFound,
            },
            ProvError::DuplicatePK { .. } => ProvErrorCode::DuplicatePrimaryKey,
            ProvError::UnknownColumn { .. } => ProvErrorCode::UnknownColumn,
            ProvError::TypeMismatch { .. } => ProvErrorCode::TypeMismatch,
            ProvError::NotNullViolation { .. } => ProvErrorCode::NotNullViolation,
            ProvError::ForeignKeyViolation { .. } => ProvErrorCode::ForeignKeyViolation,
            ProvError::PermissionDenied(_) => ProvErrorCode::PermissionDenied,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::{ProvError, ProvErrorCode, ResourceType};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(ProvErrorCode::UnresolvedActor.as_str(), "unresolved_actor");
        assert_eq!(ProvErrorCode::NoActiveVersion.as_str(), "no_active_version");
        assert_eq!(
            ProvErrorCode::ConflictingActivation.as_str(),
            "conflicting_activation"
        );
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = ProvError::not_found(ResourceType::Family, "network");
        assert_eq!(err.code(), ProvErrorCode::FamilyNotFound);
        assert_eq!(err.code_str(), "family_not_found");
    }

    #[test]
    fn unresolved_actor_message_is_actionable() {
        let err = ProvError::UnresolvedActor {
            identity: "etl_loader".into(),
        };
        let message = err.to_string();
        assert!(message.contains("etl_loader"));
        assert!(message.contains("register this identity before writing"));
    }
}
