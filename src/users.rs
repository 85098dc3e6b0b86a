// src/users.rs
use crate::auth::AuthUser;
use crate::courses::CourseCache;
use crate::db::Storage;
use crate::error::ApiError;
use crate::models::{Course, User, UserPayload};
use crate::pagination::{DEFAULT_PAGINATOR, PageParams};
use actix_web::{HttpRequest, HttpResponse, delete, get, patch, put, web};
use uuid::Uuid;
use validator::Validate;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_users);
    cfg.service(current_user);
    cfg.service(update_current_user);
    cfg.service(get_user);
    cfg.service(update_user);
    cfg.service(partial_update_user);
    cfg.service(delete_user);
}

// `is_active` is only honoured when the caller is staff.
fn apply(target: &mut User, payload: UserPayload, partial: bool, caller_is_staff: bool) {
    if partial {
        if let Some(first_name) = payload.first_name {
            target.first_name = first_name;
        }
        if let Some(last_name) = payload.last_name {
            target.last_name = last_name;
        }
        if payload.phone.is_some() {
            target.phone = payload.phone;
        }
        if payload.city.is_some() {
            target.city = payload.city;
        }
        if payload.avatar.is_some() {
            target.avatar = payload.avatar;
        }
    } else {
        target.first_name = payload.first_name.unwrap_or_default();
        target.last_name = payload.last_name.unwrap_or_default();
        target.phone = payload.phone;
        target.city = payload.city;
        target.avatar = payload.avatar;
    }
    if caller_is_staff {
        if let Some(active) = payload.is_active {
            target.is_active = active;
        }
    }
}

/// Loads `id` if the caller is that user or staff.
async fn load_accessible(store: &dyn Storage, caller: &User, id: Uuid) -> Result<User, ApiError> {
    if caller.id != id && !caller.is_staff {
        return Err(ApiError::forbidden());
    }
    store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

async fn save(
    store: &dyn Storage,
    caller: &User,
    mut target: User,
    payload: UserPayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    apply(&mut target, payload, partial, caller.is_staff);
    store.update_user(&target).await?;
    tracing::info!("User {} updated profile of {}", caller.id, target.id);
    Ok(HttpResponse::Ok().json(target))
}

/// Deleting a user orphans their courses, so cached copies still naming
/// them as owner must go.
fn forget_owner(cache: &CourseCache, owner_id: Uuid) {
    let owned = move |_: &Uuid, course: &Course| course.owner_id == Some(owner_id);
    if let Err(e) = cache.invalidate_entries_if(owned) {
        tracing::warn!("Falling back to clearing the course cache: {}", e);
        cache.invalidate_all();
    }
}

#[get("/users/")]
pub async fn list_users(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    params: web::Query<PageParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    if !user.is_staff {
        return Err(ApiError::forbidden());
    }
    let window = DEFAULT_PAGINATOR.window(&params)?;
    let (users, total) = store.list_users(window).await?;
    let page = DEFAULT_PAGINATOR.page(window, total, users, &req)?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/me/")]
pub async fn current_user(user: AuthUser) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(&user.0))
}

#[patch("/me/")]
pub async fn update_current_user(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse, ApiError> {
    let target = user.0.clone();
    save(store.get_ref(), &user, target, payload.into_inner(), true).await
}

#[get("/users/{id}/")]
pub async fn get_user(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let target = load_accessible(store.get_ref(), &user, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(target))
}

#[put("/users/{id}/")]
pub async fn update_user(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse, ApiError> {
    let target = load_accessible(store.get_ref(), &user, path.into_inner()).await?;
    save(store.get_ref(), &user, target, payload.into_inner(), false).await
}

#[patch("/users/{id}/")]
pub async fn partial_update_user(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse, ApiError> {
    let target = load_accessible(store.get_ref(), &user, path.into_inner()).await?;
    save(store.get_ref(), &user, target, payload.into_inner(), true).await
}

#[delete("/users/{id}/")]
pub async fn delete_user(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    cache: web::Data<CourseCache>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let target = load_accessible(store.get_ref(), &user, path.into_inner()).await?;
    store.delete_user(target.id).await?;
    forget_owner(&cache, target.id);
    tracing::info!("User {} deleted account {}", user.id(), target.id);
    Ok(HttpResponse::NoContent().finish())
}
