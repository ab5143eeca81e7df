use axum::{
    extract::{FromRef, Path, State},
    http::{header, HeaderMap, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        cookie::{self, CookieOptions},
        dto::{
            AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
            MessageResponse, ResetPasswordRequest, SignupRequest, UserResponse,
        },
        jwt::{AuthUser, JwtKeys},
        password::verify_password_async,
        recovery,
        repo::UserPatch,
    },
    error::ApiError,
    mail,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/reset/:reset_token", post(reset_password))
        .route("/auth/password/change", post(change_password))
        .route("/auth/profile", get(get_profile))
}

fn session_headers(state: &AppState, token: &str) -> Result<HeaderMap, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let opts = CookieOptions::new(state.config.cookie_secure, keys.ttl());
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&opts.session(token)).map_err(anyhow::Error::from)?,
    );
    Ok(headers)
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    payload.name = payload.name.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Please fill all fields"));
    }

    let user = state
        .users
        .create(&payload.name, &payload.email, &payload.password)
        .await?;

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    let headers = session_headers(&state, &token)?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        headers,
        Json(AuthResponse {
            success: true,
            token,
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Please fill all fields"));
    }

    // Unknown email and wrong password answer identically so the endpoint
    // cannot be used to probe which addresses are registered.
    let user = match state.users.find_by_email(&payload.email, true).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::invalid_credentials("Invalid credentials"));
        }
    };

    let hash = user
        .password_hash
        .clone()
        .ok_or_else(|| anyhow::anyhow!("credential record is missing its digest"))?;
    if !verify_password_async(payload.password, hash).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::invalid_credentials("Invalid credentials"));
    }

    let mut user = user;
    user.password_hash = None;

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    let headers = session_headers(&state, &token)?;

    info!(user_id = %user.id, "user logged in");
    Ok((
        headers,
        Json(AuthResponse {
            success: true,
            token,
            user,
        }),
    ))
}

/// Stateless logout: tokens are time-bounded, so clearing the cookie is all
/// there is to do.
#[instrument]
pub async fn logout() -> (HeaderMap, Json<MessageResponse>) {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie::expired()).expect("fixed cookie value"),
    );
    (
        headers,
        Json(MessageResponse {
            success: true,
            message: "Logged Out".into(),
        }),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() {
        return Err(ApiError::validation("Please enter email"));
    }

    let user = state
        .users
        .find_by_email(&payload.email, false)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let token = recovery::generate(OffsetDateTime::now_utc());
    state
        .users
        .save(
            user.id,
            UserPatch::set_recovery(token.hashed.clone(), token.expires_at),
            false,
        )
        .await?;

    let reset_url = format!(
        "{}/api/auth/password/reset/{}",
        state.config.public_url, token.raw
    );
    let body = mail::password_reset_body(&reset_url);

    if let Err(delivery_err) = state
        .mailer
        .send(&user.email, mail::RESET_SUBJECT, &body)
        .await
    {
        // Compensating transaction: clear the pending recovery fields through
        // the validation-skipping save path. A rollback failure is logged,
        // never propagated, so it cannot mask the delivery error.
        if let Err(rollback_err) = state
            .users
            .save(user.id, UserPatch::clear_recovery(), false)
            .await
        {
            error!(error = %rollback_err, user_id = %user.id, "recovery rollback failed");
        }
        warn!(error = %delivery_err, user_id = %user.id, "reset email delivery failed");
        return Err(ApiError::delivery(delivery_err.to_string()));
    }

    info!(user_id = %user.id, "reset email sent");
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Email sent to {}", user.email),
    }))
}

#[instrument(skip(state, payload, reset_token))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(reset_token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(HeaderMap, Json<UserResponse>), ApiError> {
    if payload.password.is_empty() || payload.confirm_password.is_empty() {
        return Err(ApiError::validation("Please fill all fields"));
    }

    let hashed = recovery::digest(&reset_token);
    let user = state
        .users
        .find_by_recovery(&hashed, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| ApiError::invalid_credentials("Password token is invalid or expired"))?;

    if payload.password != payload.confirm_password {
        return Err(ApiError::validation(
            "Password and confirm password do not match",
        ));
    }

    // New credential and recovery-field clear commit as one transition.
    let user = state
        .users
        .save(
            user.id,
            UserPatch::password_and_clear_recovery(payload.password),
            true,
        )
        .await?;

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    let headers = session_headers(&state, &token)?;

    info!(user_id = %user.id, "password reset");
    Ok((
        headers,
        Json(UserResponse {
            success: true,
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(HeaderMap, Json<UserResponse>), ApiError> {
    if payload.old_password.is_empty()
        || payload.new_password.is_empty()
        || payload.confirm_new_password.is_empty()
    {
        return Err(ApiError::validation("All fields are required"));
    }
    if payload.new_password != payload.confirm_new_password {
        return Err(ApiError::validation(
            "New and confirm password do not match",
        ));
    }

    let stored = state
        .users
        .find_by_id(auth.id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let hash = stored
        .password_hash
        .ok_or_else(|| anyhow::anyhow!("credential record is missing its digest"))?;
    if !verify_password_async(payload.old_password, hash).await? {
        return Err(ApiError::invalid_credentials("Old password is invalid"));
    }

    let user = state
        .users
        .save(stored.id, UserPatch::password(payload.new_password), true)
        .await?;

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    let headers = session_headers(&state, &token)?;

    info!(user_id = %user.id, "password changed");
    Ok((
        headers,
        Json(UserResponse {
            success: true,
            user,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(auth.id, false)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}
