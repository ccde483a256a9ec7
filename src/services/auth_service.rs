use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    models::User,
    response::ApiResponse,
    services::validate,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn issue_token(user_id: Uuid, role: &str, secret: &str, ttl_hours: i64) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let email = validate::email(&payload.email)?;
    let name = validate::required("name", &payload.name)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let exists = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email),
        phone: Set(validate::optional(payload.phone)),
        password_hash: Set(hash_password(&payload.password)?),
        role: Set(ROLE_USER.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::item("User created", User::from(user)))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    login(state, payload, false).await
}

/// Login for the admin dashboard; valid customer credentials are refused.
pub async fn login_admin(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    login(state, payload, true).await
}

async fn login(
    state: &AppState,
    payload: LoginRequest,
    admin_only: bool,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = payload.email.trim().to_lowercase();
    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    if admin_only && user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }

    let token = issue_token(
        user.id,
        &user.role,
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
    )?;

    audit::record(
        &state.orm,
        Some(user.id),
        if admin_only { "admin_login" } else { "user_login" },
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::item(
        "Logged in",
        LoginResponse {
            token: format!("Bearer {token}"),
            user: User::from(user),
        },
    ))
}

pub async fn current_user(state: &AppState, auth: &AuthUser) -> AppResult<ApiResponse<User>> {
    let user = Users::find_by_id(auth.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;
    Ok(ApiResponse::item("OK", User::from(user)))
}

/// Create the account, or reset the password and role of an existing one.
/// Used by the bootstrap binaries.
pub async fn ensure_user_with_role<C: ConnectionTrait>(
    db: &C,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> AppResult<Uuid> {
    let email = validate::email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let password_hash = hash_password(password)?;

    let existing = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(db)
        .await?;

    let user = match existing {
        Some(user) => {
            let mut active: UserActive = user.into();
            active.password_hash = Set(password_hash);
            active.role = Set(role.to_string());
            active.update(db).await?
        }
        None => {
            UserActive {
                id: Set(Uuid::new_v4()),
                name: Set(validate::required("name", name)?),
                email: Set(email),
                phone: Set(None),
                password_hash: Set(password_hash),
                role: Set(role.to_string()),
                created_at: NotSet,
            }
            .insert(db)
            .await?
        }
    };

    tracing::info!(user_id = %user.id, role, "account ensured");
    Ok(user.id)
}
