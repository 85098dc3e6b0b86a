// src/subscriptions.rs
use crate::auth::AuthUser;
use crate::db::Storage;
use crate::error::ApiError;
use crate::models::{CourseRef, Subscription};
use actix_web::{HttpResponse, post, web};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(subscribe);
    cfg.service(unsubscribe);
}

fn required_course_id(body: &CourseRef) -> Result<Uuid, ApiError> {
    body.course_id
        .ok_or_else(|| ApiError::BadRequest("course_id is required".to_string()))
}

#[post("/subscribe/")]
pub async fn subscribe(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    body: web::Json<CourseRef>,
) -> Result<HttpResponse, ApiError> {
    let course_id = required_course_id(&body)?;
    if store.get_course(course_id).await?.is_none() {
        return Err(ApiError::not_found("Course"));
    }

    let subscription = Subscription {
        id: Uuid::new_v4(),
        user_id: user.id(),
        course_id,
        created_at: Utc::now(),
    };
    if store.subscribe(&subscription).await? {
        tracing::info!("User {} subscribed to course {}", user.id(), course_id);
        Ok(HttpResponse::Created().json(json!({"status": "subscription created"})))
    } else {
        Ok(HttpResponse::Ok().json(json!({"status": "already subscribed"})))
    }
}

#[post("/unsubscribe/")]
pub async fn unsubscribe(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    body: web::Json<CourseRef>,
) -> Result<HttpResponse, ApiError> {
    let course_id = required_course_id(&body)?;
    if store.unsubscribe(user.id(), course_id).await? {
        tracing::info!("User {} unsubscribed from course {}", user.id(), course_id);
        Ok(HttpResponse::Ok().json(json!({"status": "subscription deleted"})))
    } else {
        Ok(HttpResponse::NotFound().json(json!({"status": "subscription not found"})))
    }
}
