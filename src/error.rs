use anyhow::anyhow;
use serde::Serialize;

use crate::models::CategoryId;
use crate::roles::Role;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Validation,
    NotFound,
    Cycle,
    DuplicateSlug,
    InternalConsistency,
    Storage,
    Unknown,
}

impl ErrorKind {
    /// Only transient storage failures may succeed on retry; invariant
    /// violations produce the same outcome every time.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Storage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDetails {
    MissingRole {
        required: Role,
        actual: Option<Role>,
    },
    CyclePath {
        node_id: CategoryId,
        ancestors: Vec<CategoryId>,
    },
    DuplicateSlug {
        slug: String,
    },
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub details: Option<ErrorDetails>,
    pub source: anyhow::Error,
}

impl LibError {
    fn new(kind: ErrorKind, code: &'static str, public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind,
            code,
            public,
            details: None,
            source,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unauthorized(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(ErrorKind::Unauthorized, "unauthorized", public, source)
    }

    pub fn missing_role(required: Role, actual: Option<Role>) -> Self {
        Self::unauthorized(
            "You do not have permission to perform this action",
            anyhow!(
                "role {} does not satisfy required role {}",
                actual.map_or("<anonymous>", Role::as_str),
                required
            ),
        )
        .with_details(ErrorDetails::MissingRole { required, actual })
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(ErrorKind::Validation, "invalid_input", public, source)
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::new(ErrorKind::Validation, code, public, source)
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(ErrorKind::NotFound, "not_found", public, source)
    }

    pub fn cycle(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(ErrorKind::Cycle, "category_cycle", public, source)
    }

    pub fn duplicate_slug(slug: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateSlug,
            "duplicate_slug",
            "A category with this slug already exists",
            anyhow!("slug '{}' is already taken", slug),
        )
        .with_details(ErrorDetails::DuplicateSlug {
            slug: slug.to_string(),
        })
    }

    pub fn internal_consistency(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(
            ErrorKind::InternalConsistency,
            "internal_consistency",
            public,
            source,
        )
    }

    pub fn storage(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(ErrorKind::Storage, "storage_error", public, source)
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self::new(ErrorKind::Unknown, "unknown_error", public, source)
    }

    pub fn message(public: &'static str) -> Self {
        Self::unknown(public, anyhow!(public))
    }
}

impl std::fmt::Display for LibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.public)
    }
}

impl std::error::Error for LibError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl LibError {
    /// Maps a Postgres SQLSTATE onto the taxonomy error kinds. Constraint and
    /// data violations are not retryable; anything else is a storage error.
    #[cfg_attr(not(feature = "sqlx"), allow(dead_code))]
    pub(crate) fn from_sqlstate(code: Option<&str>, source: anyhow::Error) -> Self {
        match code {
            Some("23505") => Self::new(
                ErrorKind::DuplicateSlug,
                "duplicate_slug",
                "A category with this slug already exists",
                source,
            ),
            Some("23503") => Self::not_found("Referenced category not found", source),
            Some("22001") => Self::invalid_with_code(
                "value_too_long",
                "Value is too long for its column",
                source,
            ),
            _ => Self::storage("Database request failed", source),
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        let code = value
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned());
        Self::from_sqlstate(code.as_deref(), anyhow!(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(ErrorKind::Storage.is_retryable());
        for kind in [
            ErrorKind::Unauthorized,
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Cycle,
            ErrorKind::DuplicateSlug,
            ErrorKind::InternalConsistency,
            ErrorKind::Unknown,
        ] {
            assert!(!kind.is_retryable(), "{kind:?} should not be retryable");
        }
    }

    #[test]
    fn missing_role_carries_structured_details() {
        let err = LibError::missing_role(Role::Contributor, Some(Role::Viewer));
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(
            err.details,
            Some(ErrorDetails::MissingRole {
                required: Role::Contributor,
                actual: Some(Role::Viewer),
            })
        );
    }

    #[test]
    fn sqlstates_map_to_error_kinds() {
        let kind = |code| LibError::from_sqlstate(code, anyhow!("db")).kind;
        assert_eq!(kind(Some("23505")), ErrorKind::DuplicateSlug);
        assert_eq!(kind(Some("23503")), ErrorKind::NotFound);
        assert_eq!(kind(Some("40001")), ErrorKind::Storage);
        assert_eq!(kind(None), ErrorKind::Storage);

        let err = LibError::from_sqlstate(Some("22001"), anyhow!("value too long"));
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.code, "value_too_long");
        assert!(!err.kind.is_retryable());
    }

    #[test]
    fn duplicate_slug_serializes_details() {
        let err = LibError::duplicate_slug("tech-news");
        let details = serde_json::to_value(err.details.expect("details present"))
            .expect("details should serialize");
        assert_eq!(
            details,
            serde_json::json!({"type": "duplicate_slug", "slug": "tech-news"})
        );
    }
}
