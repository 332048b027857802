//! Registration, login and bearer-token extraction.

pub mod jwt;
pub mod password;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::MIN_PASSWORD_LEN;
use crate::error::{AppError, AppResult};
use crate::models::{User, UserProfile};
use crate::store::NewUser;
use crate::users::UsersService;

pub use jwt::{Claims, JwtManager};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct AuthService {
    users: UsersService,
    jwt: JwtManager,
}

impl AuthService {
    pub fn new(users: UsersService, jwt: JwtManager) -> Self {
        Self { users, jwt }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = normalize_email(&request.email);
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("User with email {email} already exists")));
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                name,
            })
            .await?;
        self.respond(&user)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = normalize_email(&request.email);
        let password = request.password;
        let Some(user) = self.users.find_by_email(&email).await? else {
            tokio::task::spawn_blocking(move || password::verify_against_dummy(&password))
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            warn!("login for unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if !valid {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        info!(user_id = %user.id, "user logged in");
        self.respond(&user)
    }

    fn respond(&self, user: &User) -> AppResult<AuthResponse> {
        let access_token = self
            .jwt
            .issue(user.id, &user.email)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(user),
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The authenticated caller, taken from a `Bearer` access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthUser
where
    JwtManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = JwtManager::from_ref(state)
            .validate(token)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(Self { user_id })
    }
}
