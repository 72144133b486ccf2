use std::fmt::{self, Display};

use potion::{Error, HtmlError};
use serde_json::{json, Value};
use warp::reject::Rejection;

use super::schema::MembershipKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }

    /// Unique and check constraint violations surface as conflicts rather than failures.
    pub fn is_constraint_violation(error: &sqlx::Error) -> bool {
        match error {
            sqlx::Error::Database(e) => e.is_unique_violation() || e.is_check_violation(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new(String::from("Unknown error")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    info: String,
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    info: String,
}

impl ConfigError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Misconfigured environment: {}", self.info)
    }
}

impl std::error::Error for ConfigError {}

/// Failure of a domain operation. Field-scoped variants carry the offending
/// payload field and a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    RequiredFieldMissing { field: &'static str, info: String },
    InvalidAmount { field: &'static str, info: String },
    InvalidField { field: &'static str, info: String },
    UnknownReference { field: &'static str, info: String },
    DuplicateInList { field: &'static str, info: String },
    MembershipConflict(MembershipKind),
    MembershipNotFound(MembershipKind),
    RecipeNotFound,
    UserNotFound,
    UserConflict,
    SelfFollowRejected,
    SubscriptionConflict,
    SubscriptionNotFound,
    Persistence { info: String },
    /// Failure outside storage, such as password hashing.
    Internal { info: String },
}

impl DomainError {
    pub fn required(field: &'static str) -> Self {
        Self::RequiredFieldMissing {
            field,
            info: String::from("This field is required"),
        }
    }

    pub fn invalid_amount(info: &str) -> Self {
        Self::InvalidAmount {
            field: "ingredients_amount",
            info: info.to_string(),
        }
    }

    pub fn invalid_field(field: &'static str, info: &str) -> Self {
        Self::InvalidField {
            field,
            info: info.to_string(),
        }
    }

    pub fn unknown(field: &'static str, info: &str) -> Self {
        Self::UnknownReference {
            field,
            info: info.to_string(),
        }
    }

    pub fn duplicate(field: &'static str, info: &str) -> Self {
        Self::DuplicateInList {
            field,
            info: info.to_string(),
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            DomainError::RequiredFieldMissing { field, .. }
            | DomainError::InvalidAmount { field, .. }
            | DomainError::InvalidField { field, .. }
            | DomainError::UnknownReference { field, .. }
            | DomainError::DuplicateInList { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Referential errors point at reference data that does not exist, as
    /// opposed to structurally malformed submissions.
    pub fn is_referential(&self) -> bool {
        matches!(self, DomainError::UnknownReference { .. })
    }

    pub fn status(&self) -> u16 {
        match self {
            DomainError::RecipeNotFound | DomainError::UserNotFound => 404,
            DomainError::Persistence { .. } | DomainError::Internal { .. } => 500,
            _ => 400,
        }
    }

    /// `{"field": ["message"]}` for field errors, `{"errors": "message"}` otherwise.
    pub fn to_json(&self) -> Value {
        match self.field() {
            Some(field) => json!({ field: [self.to_string()] }),
            None => json!({ "errors": self.to_string() }),
        }
    }
}

impl Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::RequiredFieldMissing { info, .. }
            | DomainError::InvalidAmount { info, .. }
            | DomainError::InvalidField { info, .. }
            | DomainError::UnknownReference { info, .. }
            | DomainError::DuplicateInList { info, .. } => write!(f, "{info}"),
            DomainError::MembershipConflict(kind) => {
                write!(f, "Recipe is already in {}", kind.label())
            }
            DomainError::MembershipNotFound(kind) => {
                write!(f, "Recipe is not in {}", kind.label())
            }
            DomainError::RecipeNotFound => write!(f, "No recipe exists with specified id"),
            DomainError::UserNotFound => write!(f, "No user exists with specified id"),
            DomainError::UserConflict => {
                write!(f, "User with this email or username already exists")
            }
            DomainError::SelfFollowRejected => write!(f, "You can't subscribe to yourself"),
            DomainError::SubscriptionConflict => {
                write!(f, "You are already subscribed to this author")
            }
            DomainError::SubscriptionNotFound => {
                write!(f, "You are not subscribed to this author")
            }
            DomainError::Persistence { info } => write!(f, "Persistence failure ({info})"),
            DomainError::Internal { info } => write!(f, "Internal failure ({info})"),
        }
    }
}

impl std::error::Error for DomainError {}

impl From<QueryError> for DomainError {
    fn from(value: QueryError) -> Self {
        Self::Persistence { info: value.info }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

impl From<CacheError> for DomainError {
    fn from(value: CacheError) -> Self {
        Self::Persistence { info: value.info }
    }
}

impl From<ConfigError> for DomainError {
    fn from(value: ConfigError) -> Self {
        Self::Persistence { info: value.info }
    }
}

impl From<argon2::password_hash::Error> for DomainError {
    fn from(value: argon2::password_hash::Error) -> Self {
        Self::Internal {
            info: format!("Failed to hash password: {value}"),
        }
    }
}

impl From<DomainError> for Error {
    fn from(value: DomainError) -> Self {
        match value.status() {
            400 => HtmlError::InvalidRequest.new(&value.to_json().to_string()),
            404 => Error {
                code: 404,
                info: Some(value.to_string()),
                redirect: None,
            },
            _ => Error {
                code: 500,
                info: Some(value.to_string()),
                redirect: None,
            },
        }
    }
}

impl From<DomainError> for Rejection {
    fn from(value: DomainError) -> Self {
        let error: Error = value.into();
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_render_drf_style() {
        let error = DomainError::duplicate("tags", "Tag must not repeat");

        assert_eq!(error.field(), Some("tags"));
        assert_eq!(error.to_json(), json!({ "tags": ["Tag must not repeat"] }));
        assert_eq!(error.status(), 400);
    }

    #[test]
    fn membership_messages_name_the_kind() {
        assert_eq!(
            DomainError::MembershipNotFound(MembershipKind::Favorite).to_string(),
            "Recipe is not in favorites"
        );
        assert_eq!(
            DomainError::MembershipNotFound(MembershipKind::ShoppingCart).to_string(),
            "Recipe is not in shopping cart"
        );
        assert_eq!(
            DomainError::MembershipConflict(MembershipKind::ShoppingCart).field(),
            None
        );
    }

    #[test]
    fn referential_errors_are_distinguished() {
        assert!(DomainError::unknown("tags", "Tag does not exist").is_referential());
        assert!(!DomainError::duplicate("tags", "Tag must not repeat").is_referential());
        assert!(!DomainError::required("ingredients").is_referential());
    }

    #[test]
    fn storage_failures_become_persistence_errors() {
        let error: DomainError = sqlx::Error::PoolTimedOut.into();

        assert_eq!(
            error,
            DomainError::Persistence {
                info: String::from("Pool timed out")
            }
        );
        assert_eq!(error.status(), 500);
        assert_eq!(DomainError::RecipeNotFound.status(), 404);
    }
}
