//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        event::{ChangeAction, ChangeEvent, ChangeTable},
        user::{
            CreateUser, LoginRequest, LoginResponse, Profile, RegisterRequest, Role, UpdateProfile,
            UpdateUser, UserClaims,
        },
    },
    query::{Page, SearchRequest},
    repository::Repository,
    services::events::ChangeFeed,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    events: ChangeFeed,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, events: ChangeFeed) -> Self {
        Self { repository, config, events }
    }

    // =========================================================================
    // AUTHENTICATION
    // =========================================================================

    /// Authenticate by email and password and issue a JWT
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginResponse> {
        request.validate()?;

        let user = self
            .repository
            .users
            .get_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !self.verify_password(&user, &request.password)? {
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        if !user.is_active {
            return Err(AppError::Authentication("Account is deactivated".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!(user_id = %user.id, role = %user.role, "user logged in");

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.jwt_expiration_hours as i64 * 3600,
            user,
        })
    }

    /// Self-registration of a student account
    pub async fn register(&self, request: RegisterRequest) -> AppResult<Profile> {
        if !self.config.allow_registration {
            return Err(AppError::Authorization("Registration is disabled".to_string()));
        }
        self.create_user(request.into()).await
    }

    fn create_token_for_user(&self, user: &Profile) -> AppResult<String> {
        UserClaims::new(user.id, user.role, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn verify_password(&self, user: &Profile, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Create the configured administrator when no active admin exists
    pub async fn bootstrap_admin(&self) -> AppResult<Option<Profile>> {
        let (Some(email), Some(password)) = (
            self.config.bootstrap_admin_email.clone(),
            self.config.bootstrap_admin_password.clone(),
        ) else {
            return Ok(None);
        };

        if self.repository.users.admin_exists().await? {
            return Ok(None);
        }

        let admin = self
            .create_user(CreateUser {
                email,
                password,
                full_name: "Administrator".to_string(),
                role: Some(Role::Admin),
                student_id: None,
                class_name: None,
                phone: None,
            })
            .await?;

        tracing::info!(email = %admin.email, "bootstrap administrator created");
        Ok(Some(admin))
    }

    // =========================================================================
    // USERS
    // =========================================================================

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Profile> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search(&self, request: &SearchRequest) -> AppResult<Page<Profile>> {
        let (users, total) = self.repository.users.search(request).await?;
        Ok(Page::new(users, total, &request.pagination))
    }

    pub async fn create_user(&self, user: CreateUser) -> AppResult<Profile> {
        user.validate()?;

        if self.repository.users.email_exists(&user.email, None).await? {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let hash = self.hash_password(&user.password)?;
        let created = self.repository.users.create(&user, &hash).await?;
        self.publish(ChangeAction::Insert, &created);
        Ok(created)
    }

    /// Admin update of another account; `actor` is the caller
    pub async fn update_user(&self, actor: Uuid, id: Uuid, user: UpdateUser) -> AppResult<Profile> {
        user.validate()?;

        if let Some(ref email) = user.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }

        if user.is_active == Some(false) {
            refuse_self_deactivation(actor, id)?;
            self.check_can_deactivate(id, false).await?;
        }

        let updated = self.repository.users.update(id, &user).await?;
        self.publish(ChangeAction::Update, &updated);
        Ok(updated)
    }

    /// Update the caller's own profile; a password change needs the current password
    pub async fn update_profile(&self, user_id: Uuid, profile: UpdateProfile) -> AppResult<Profile> {
        profile.validate()?;

        let user = self.repository.users.get_by_id(user_id).await?;

        if let Some(ref email) = profile.email {
            if self.repository.users.email_exists(email, Some(user_id)).await? {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }

        let password_hash = match profile.new_password {
            Some(ref new_password) => {
                let current = profile.current_password.as_ref().ok_or_else(|| {
                    AppError::Validation("Current password required to change password".to_string())
                })?;
                if !self.verify_password(&user, current)? {
                    return Err(AppError::Authentication("Current password is incorrect".to_string()));
                }
                Some(self.hash_password(new_password)?)
            }
            None => None,
        };

        let updated = self
            .repository
            .users
            .update_profile(user_id, &profile, password_hash)
            .await?;
        self.publish(ChangeAction::Update, &updated);
        Ok(updated)
    }

    /// Change a user's role (admin only); admins cannot demote themselves
    pub async fn update_role(&self, actor: Uuid, id: Uuid, role: Role) -> AppResult<Profile> {
        if actor == id && role != Role::Admin {
            return Err(AppError::BusinessRule("Administrators cannot demote themselves".to_string()));
        }

        let updated = self.repository.users.update_role(id, role).await?;
        self.publish(ChangeAction::Update, &updated);
        Ok(updated)
    }

    /// Deactivate an account, refused while the user holds books unless `force`
    pub async fn deactivate(&self, actor: Uuid, id: Uuid, force: bool) -> AppResult<Profile> {
        refuse_self_deactivation(actor, id)?;
        self.check_can_deactivate(id, force).await?;

        let updated = self.repository.users.set_active(id, false).await?;
        self.publish(ChangeAction::Update, &updated);
        Ok(updated)
    }

    async fn check_can_deactivate(&self, id: Uuid, force: bool) -> AppResult<()> {
        let open = self.repository.borrowings.count_open_for_user(id).await?;
        if open > 0 && !force {
            return Err(AppError::BusinessRule(format!(
                "User still holds {} borrowed book(s)",
                open
            )));
        }
        Ok(())
    }

    fn publish(&self, action: ChangeAction, user: &Profile) {
        self.events
            .publish(ChangeEvent::new(ChangeTable::Profiles, action, user.id, Some(user)));
    }
}

fn refuse_self_deactivation(actor: Uuid, id: Uuid) -> AppResult<()> {
    if actor == id {
        return Err(AppError::BusinessRule("Users cannot deactivate themselves".to_string()));
    }
    Ok(())
}
