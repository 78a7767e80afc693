//! Users (profiles) repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::user::{CreateUser, Profile, Role, UpdateProfile, UpdateUser},
    query::{Queryable, SearchRequest, SqlTranslator},
};

const PROFILE_COLUMNS: &str = r#"
    SELECT p.id, p.email, p.password_hash, p.full_name, p.role, p.student_id,
           p.class_name, p.phone, p.is_active, p.created_at, p.updated_at
    FROM profiles p
"#;

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(&format!("{} WHERE p.id = $1", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by email (login identifier, case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<Profile>> {
        let user = sqlx::query_as::<_, Profile>(&format!(
            "{} WHERE LOWER(p.email) = LOWER($1)",
            PROFILE_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Check if email already exists
    pub async fn email_exists(&self, email: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE LOWER(email) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn admin_exists(&self) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE role = 'admin' AND is_active)")
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Search users with pagination
    pub async fn search(&self, request: &SearchRequest) -> AppResult<(Vec<Profile>, i64)> {
        let translator = SqlTranslator::new(Profile::schema());

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM profiles p WHERE 1=1");
        translator.push_conditions(&mut count, request)?;
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(PROFILE_COLUMNS);
        query.push(" WHERE 1=1");
        translator.push_conditions(&mut query, request)?;
        translator.push_order_by(&mut query, request)?;
        translator.push_pagination(&mut query, &request.pagination);

        let users = query.build_query_as::<Profile>().fetch_all(&self.pool).await?;
        Ok((users, total))
    }

    /// Create a new user with an already hashed password
    pub async fn create(&self, user: &CreateUser, password_hash: &str) -> AppResult<Profile> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO profiles (id, email, password_hash, full_name, role, student_id, class_name, phone, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $9)
            "#,
        )
        .bind(id)
        .bind(user.email.trim())
        .bind(password_hash)
        .bind(user.full_name.trim())
        .bind(user.role.unwrap_or(Role::Student))
        .bind(&user.student_id)
        .bind(&user.class_name)
        .bind(&user.phone)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Update an existing user
    pub async fn update(&self, id: Uuid, user: &UpdateUser) -> AppResult<Profile> {
        let result = sqlx::query(
            r#"
            UPDATE profiles SET
                email = COALESCE($2, email),
                full_name = COALESCE($3, full_name),
                student_id = COALESCE($4, student_id),
                class_name = COALESCE($5, class_name),
                phone = COALESCE($6, phone),
                is_active = COALESCE($7, is_active),
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(user.email.as_deref().map(str::trim))
        .bind(user.full_name.as_deref().map(str::trim))
        .bind(&user.student_id)
        .bind(&user.class_name)
        .bind(&user.phone)
        .bind(user.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        self.get_by_id(id).await
    }

    /// Update own profile; `password_hash` replaces the password when present
    pub async fn update_profile(
        &self,
        id: Uuid,
        profile: &UpdateProfile,
        password_hash: Option<String>,
    ) -> AppResult<Profile> {
        sqlx::query(
            r#"
            UPDATE profiles SET
                email = COALESCE($2, email),
                full_name = COALESCE($3, full_name),
                phone = COALESCE($4, phone),
                password_hash = COALESCE($5, password_hash),
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(profile.email.as_deref().map(str::trim))
        .bind(profile.full_name.as_deref().map(str::trim))
        .bind(&profile.phone)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    pub async fn update_role(&self, id: Uuid, role: Role) -> AppResult<Profile> {
        let result = sqlx::query("UPDATE profiles SET role = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(role)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        self.get_by_id(id).await
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> AppResult<Profile> {
        let result = sqlx::query("UPDATE profiles SET is_active = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        self.get_by_id(id).await
    }
}
