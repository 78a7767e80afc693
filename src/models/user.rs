//! User profile model, roles and JWT claims

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    query::{FieldDef, FieldKind, Queryable, Schema, SortKey, Value},
};

/// International or local phone number: optional `+`, digits, spaces, dashes, parentheses
pub static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ()\-]{7,20}$").expect("valid phone regex"));

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// Teachers and admins manage the catalog and borrowings
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// SQLx conversion for Role (stored as TEXT)
impl sqlx::Type<Postgres> for Role {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for Role {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for Role {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// User profile from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub class_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

static PROFILE_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new("profiles", "p.id")
        .with(FieldDef::new("id", "p.id", FieldKind::Uuid))
        .with(FieldDef::new("email", "p.email", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("full_name", "p.full_name", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("role", "p.role", FieldKind::Text).sortable())
        .with(FieldDef::new("student_id", "p.student_id", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("class_name", "p.class_name", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("phone", "p.phone", FieldKind::Text))
        .with(FieldDef::new("is_active", "p.is_active", FieldKind::Boolean).sortable())
        .with(FieldDef::new("created_at", "p.created_at", FieldKind::Timestamp).sortable())
        .search_by_default(&["full_name", "email", "student_id"])
        .sort_by_default(vec![SortKey::asc("full_name")])
});

impl Queryable for Profile {
    fn schema() -> &'static Schema {
        &PROFILE_SCHEMA
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "email" => self.email.clone().into(),
            "full_name" => self.full_name.clone().into(),
            "role" => self.role.as_str().into(),
            "student_id" => self.student_id.clone().into(),
            "class_name" => self.class_name.clone().into(),
            "phone" => self.phone.clone().into(),
            "is_active" => self.is_active.into(),
            "created_at" => self.created_at.into(),
            _ => Value::Null,
        }
    }
}

/// Self-registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 2, max = 120, message = "Full name must be 2-120 characters"))]
    pub full_name: String,
    pub student_id: Option<String>,
    pub class_name: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Invalid phone number"))]
    pub phone: Option<String>,
}

/// Create user request (admin)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 2, max = 120, message = "Full name must be 2-120 characters"))]
    pub full_name: String,
    pub role: Option<Role>,
    pub student_id: Option<String>,
    pub class_name: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Invalid phone number"))]
    pub phone: Option<String>,
}

impl From<RegisterRequest> for CreateUser {
    fn from(r: RegisterRequest) -> Self {
        Self {
            email: r.email,
            password: r.password,
            full_name: r.full_name,
            role: Some(Role::Student),
            student_id: r.student_id,
            class_name: r.class_name,
            phone: r.phone,
        }
    }
}

/// Update user request (staff)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 2, max = 120, message = "Full name must be 2-120 characters"))]
    pub full_name: Option<String>,
    pub student_id: Option<String>,
    pub class_name: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Invalid phone number"))]
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

/// Update own profile request (for authenticated users)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    /// Full name
    #[validate(length(min = 2, max = 120, message = "Full name must be 2-120 characters"))]
    pub full_name: Option<String>,
    /// Email address (must be unique)
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Invalid phone number"))]
    pub phone: Option<String>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    /// New password
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: Option<String>,
}

/// Change role request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub role: Role,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: Profile,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    pub fn new(user_id: Uuid, role: Role, ttl_hours: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(ttl_hours as i64)).timestamp(),
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    // Authorization checks
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Teacher or admin role required".to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Authorization("Admin role required".to_string()))
        }
    }

    /// Users act for themselves; staff act for anyone
    pub fn require_self_or_staff(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.sub == user_id || self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Cannot act on behalf of another user".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> UserClaims {
        UserClaims::new(Uuid::new_v4(), role, 1)
    }

    #[test]
    fn test_role_checks() {
        assert!(claims(Role::Student).require_staff().is_err());
        assert!(claims(Role::Teacher).require_staff().is_ok());
        assert!(claims(Role::Teacher).require_admin().is_err());
        assert!(claims(Role::Admin).require_admin().is_ok());
    }

    #[test]
    fn test_self_or_staff() {
        let student = claims(Role::Student);
        assert!(student.require_self_or_staff(student.sub).is_ok());
        assert!(student.require_self_or_staff(Uuid::new_v4()).is_err());
        assert!(claims(Role::Teacher).require_self_or_staff(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_token_round_trip() {
        let c = claims(Role::Admin);
        let token = c.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.sub, c.sub);
        assert_eq!(parsed.role, Role::Admin);
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("librarian".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn test_registration_validation() {
        let ok = RegisterRequest {
            email: "aisha@school.org".to_string(),
            password: "bismillah123".to_string(),
            full_name: "Aisha Rahman".to_string(),
            student_id: Some("S-1042".to_string()),
            class_name: None,
            phone: Some("+44 20 7946 0958".to_string()),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            phone: Some("call me".to_string()),
            ..ok
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("phone"));
    }
}
