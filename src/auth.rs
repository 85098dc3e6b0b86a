// src/auth.rs
use crate::config::Config;
use crate::db::Storage;
use crate::error::ApiError;
use crate::models::{Claims, RefreshRequest, RegisterRequest, TokenRequest, TokenType, User};
use crate::validators::FieldCheck;
use actix_web::{FromRequest, HttpRequest, HttpResponse, dev::Payload, http::header, post, web};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";
const INVALID_TOKEN: &str = "Given token not valid for any token type";
const SIMILAR_PASSWORD: &str = "The password is too similar to the email address.";

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register);
    cfg.service(obtain_token);
    cfg.service(refresh_token);
}

/// The authenticated, active caller. Rejects the request with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

impl std::ops::Deref for AuthUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { authenticate(&req).await })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

async fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let token = bearer_token(req).ok_or_else(|| {
        ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
    })?;

    let (Some(config), Some(store)) = (
        req.app_data::<web::Data<Config>>(),
        req.app_data::<web::Data<dyn Storage>>(),
    ) else {
        tracing::error!("Authentication state is not registered on the app");
        return Err(ApiError::Internal);
    };

    let claims = decode_token(config, token, TokenType::Access)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN.to_string()))?;

    match store.get_user(user_id).await? {
        Some(user) if user.is_active => Ok(AuthUser(user)),
        Some(_) => Err(ApiError::Unauthorized("User is inactive".to_string())),
        None => Err(ApiError::Unauthorized("User not found".to_string())),
    }
}

pub fn issue_token(
    config: &Config,
    user: &User,
    token_type: TokenType,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let lifetime = match token_type {
        TokenType::Access => Duration::minutes(config.access_token_minutes),
        TokenType::Refresh => Duration::days(config.refresh_token_days),
    };
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        token_type,
        jti: Uuid::new_v4().simple().to_string(),
        iat: now.timestamp() as usize,
        exp: (now + lifetime).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
}

pub fn decode_token(config: &Config, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::Unauthorized(INVALID_TOKEN.to_string())
    })?;

    if data.claims.token_type != expected {
        return Err(ApiError::Unauthorized(INVALID_TOKEN.to_string()));
    }
    Ok(data.claims)
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    tracing::error!("Token generation error: {}", e);
    ApiError::Internal
}

/// Registration rules, shared by the signup endpoint and the admin CLI.
pub fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut check = FieldCheck::of(req);
    if req.password.eq_ignore_ascii_case(req.email.trim()) {
        check.add("password", SIMILAR_PASSWORD);
    }
    check.finish()
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    hash(password, cost).map_err(|e| {
        tracing::error!("Password hashing error: {}", e);
        ApiError::Internal
    })
}

#[post("/register/")]
pub async fn register(
    store: web::Data<dyn Storage>,
    config: web::Data<Config>,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    validate_registration(&req)?;

    let mut user = User::new(&req.email, hash_password(&req.password, config.bcrypt_cost)?);
    user.first_name = req.first_name.unwrap_or_default();
    user.last_name = req.last_name.unwrap_or_default();
    user.phone = req.phone;
    user.city = req.city;

    store.create_user(&user).await?;
    tracing::info!("Registered user {}", user.email);
    Ok(HttpResponse::Created().json(&user))
}

/// Creates a staff superuser after the same checks a signup goes through.
pub async fn create_superuser(
    store: &dyn Storage,
    config: &Config,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let req = RegisterRequest {
        email: email.to_string(),
        password: password.to_string(),
        first_name: None,
        last_name: None,
        phone: None,
        city: None,
    };
    validate_registration(&req)?;

    let mut user = User::new(&req.email, hash_password(&req.password, config.bcrypt_cost)?);
    user.is_staff = true;
    user.is_superuser = true;
    store.create_user(&user).await?;
    tracing::info!("Created superuser {}", user.email);
    Ok(user)
}

#[post("/token/")]
pub async fn obtain_token(
    store: web::Data<dyn Storage>,
    config: web::Data<Config>,
    req: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let invalid = || ApiError::Unauthorized(INVALID_CREDENTIALS.to_string());

    let user = store
        .get_user_by_email(&req.email)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    match verify(&req.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) | Err(_) => return Err(invalid()),
    }

    store.record_login(user.id, Utc::now()).await?;

    let access = issue_token(&config, &user, TokenType::Access).map_err(token_error)?;
    let refresh = issue_token(&config, &user, TokenType::Refresh).map_err(token_error)?;
    Ok(HttpResponse::Ok().json(json!({
        "access": access,
        "refresh": refresh,
    })))
}

#[post("/token/refresh/")]
pub async fn refresh_token(
    store: web::Data<dyn Storage>,
    config: web::Data<Config>,
    req: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    let claims = decode_token(&config, &req.refresh, TokenType::Refresh)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN.to_string()))?;

    let user = store
        .get_user(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthorized(INVALID_TOKEN.to_string()))?;

    let access = issue_token(&config, &user, TokenType::Access).map_err(token_error)?;
    Ok(HttpResponse::Ok().json(json!({ "access": access })))
}
