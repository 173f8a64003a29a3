use crate::error::ProvError;
use std::collections::BTreeSet;

/// How far the operator resolver may go when an identity matches no actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// Unresolved identities are rejected with `UnresolvedActor`.
    #[default]
    Strict,
    /// Unresolved identities fall back to the default admin (superuser only)
    /// and finally to the bootstrap system actor, with a warning.
    Lenient,
}

/// Runtime configuration for a provdb instance.
#[derive(Debug, Clone)]
pub struct ProvConfig {
    pub resolution_mode: ResolutionMode,
    /// Identities that resolve leniently even when `resolution_mode` is strict.
    /// Intended for named maintenance principals.
    pub lenient_principals: BTreeSet<String>,
    pub superuser_identity: String,
    /// Email of the human actor that privileged maintenance connections are
    /// attributed to.
    pub default_admin_email: Option<String>,
    /// Columns whose name ends with this suffix count as version-id columns for
    /// the consistency checker.
    pub version_column_suffix: String,
    pub max_scan_rows: usize,
    pub max_audit_query_rows: usize,
}

impl Default for ProvConfig {
    fn default() -> Self {
        Self {
            resolution_mode: ResolutionMode::Strict,
            lenient_principals: BTreeSet::new(),
            superuser_identity: "postgres".to_string(),
            default_admin_email: None,
            version_column_suffix: "_version_id".to_string(),
            max_scan_rows: 10_000,
            max_audit_query_rows: 10_000,
        }
    }
}

impl ProvConfig {
    pub fn strict() -> Self {
        Self::default()
    }

    /// Strict for ordinary writers; the superuser identity alone takes the
    /// lenient chain and is attributed to `default_admin_email`.
    pub fn maintenance(default_admin_email: impl Into<String>) -> Self {
        let defaults = Self::default();
        let mut lenient_principals = BTreeSet::new();
        lenient_principals.insert(defaults.superuser_identity.clone());
        Self {
            default_admin_email: Some(default_admin_email.into()),
            lenient_principals,
            ..defaults
        }
    }

    /// Every identity takes the lenient chain. Local seeding and fixtures only.
    pub fn development() -> Self {
        Self {
            resolution_mode: ResolutionMode::Lenient,
            ..Self::default()
        }
    }

    pub fn with_lenient_principal(mut self, identity: impl Into<String>) -> Self {
        self.lenient_principals.insert(identity.into());
        self
    }

    pub fn with_default_admin_email(mut self, email: impl Into<String>) -> Self {
        self.default_admin_email = Some(email.into());
        self
    }

    pub fn mode_for(&self, identity: &str) -> ResolutionMode {
        if self.lenient_principals.contains(identity) {
            return ResolutionMode::Lenient;
        }
        self.resolution_mode
    }

    pub fn validate(&self) -> Result<(), ProvError> {
        if self.superuser_identity.trim().is_empty() {
            return Err(ProvError::InvalidConfig {
                message: "superuser_identity must not be empty".into(),
            });
        }
        if self.version_column_suffix.is_empty() {
            return Err(ProvError::InvalidConfig {
                message: "version_column_suffix must not be empty".into(),
            });
        }
        if self.max_scan_rows == 0 || self.max_audit_query_rows == 0 {
            return Err(ProvError::InvalidConfig {
                message: "row limits must be greater than zero".into(),
            });
        }
        if let Some(email) = &self.default_admin_email {
            if !email.contains('@') {
                return Err(ProvError::InvalidConfig {
                    message: format!("default_admin_email '{email}' is not an email address"),
                });
            }
        }
        if self.lenient_principals.iter().any(|p| p.trim().is_empty()) {
            return Err(ProvError::InvalidConfig {
                message: "lenient_principals must not contain empty identities".into(),
            });
        }
        Ok(())
    }
}
