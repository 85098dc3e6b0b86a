// src/lessons.rs
use crate::auth::AuthUser;
use crate::db::Storage;
use crate::error::ApiError;
use crate::models::{Lesson, LessonPayload};
use crate::pagination::{LESSON_PAGINATOR, PageParams};
use crate::permissions::{Action, check_object_permission, sees_all_lessons};
use crate::validators::FieldCheck;
use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, put, web};
use chrono::Utc;
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_lessons);
    cfg.service(create_lesson);
    cfg.service(get_lesson);
    cfg.service(update_lesson);
    cfg.service(partial_update_lesson);
    cfg.service(delete_lesson);
}

async fn validate(
    store: &dyn Storage,
    payload: &LessonPayload,
    partial: bool,
) -> Result<(), ApiError> {
    let mut check = FieldCheck::of(payload);
    if !partial {
        check.require("title", &payload.title);
        check.require("course", &payload.course);
    }
    if let Some(course_id) = payload.course {
        if store.get_course(course_id).await?.is_none() {
            check.add(
                "course",
                format!("Invalid pk \"{}\" - object does not exist.", course_id),
            );
        }
    }
    check.finish()
}

fn apply(lesson: &mut Lesson, payload: LessonPayload, partial: bool) {
    if let Some(course_id) = payload.course {
        lesson.course_id = course_id;
    }
    if let Some(title) = payload.title {
        lesson.title = title.trim().to_string();
    }
    if partial {
        if payload.description.is_some() {
            lesson.description = payload.description;
        }
        if payload.preview.is_some() {
            lesson.preview = payload.preview;
        }
        if payload.video_link.is_some() {
            lesson.video_link = payload.video_link;
        }
    } else {
        lesson.description = payload.description;
        lesson.preview = payload.preview;
        lesson.video_link = payload.video_link;
    }
    lesson.updated_at = Utc::now();
}

async fn load_lesson(store: &dyn Storage, id: Uuid) -> Result<Lesson, ApiError> {
    store
        .get_lesson(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson"))
}

#[get("/lessons/")]
pub async fn list_lessons(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    params: web::Query<PageParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let window = LESSON_PAGINATOR.window(&params)?;
    let owner_filter = (!sees_all_lessons(&user)).then(|| user.id());
    let (lessons, total) = store.list_lessons(owner_filter, window).await?;
    let page = LESSON_PAGINATOR.page(window, total, lessons, &req)?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/lessons/")]
pub async fn create_lesson(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    payload: web::Json<LessonPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validate(store.get_ref(), &payload, false).await?;

    let now = Utc::now();
    let mut lesson = Lesson {
        id: Uuid::new_v4(),
        course_id: Uuid::nil(),
        title: String::new(),
        description: None,
        preview: None,
        video_link: None,
        owner_id: Some(user.id()),
        created_at: now,
        updated_at: now,
    };
    apply(&mut lesson, payload, false);
    store.create_lesson(&lesson).await?;
    tracing::info!("User {} created lesson {}", user.id(), lesson.id);
    Ok(HttpResponse::Created().json(lesson))
}

#[get("/lessons/{id}/")]
pub async fn get_lesson(
    _user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let lesson = load_lesson(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(lesson))
}

async fn modify_lesson(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    id: Uuid,
    payload: LessonPayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    let mut lesson = load_lesson(store.get_ref(), id).await?;
    let action = if partial {
        Action::PartialUpdate
    } else {
        Action::Update
    };
    check_object_permission(&user, action, &lesson)?;
    validate(store.get_ref(), &payload, partial).await?;

    apply(&mut lesson, payload, partial);
    store.update_lesson(&lesson).await?;
    tracing::info!("User {} updated lesson {}", user.id(), id);
    Ok(HttpResponse::Ok().json(lesson))
}

#[put("/lessons/{id}/")]
pub async fn update_lesson(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
    payload: web::Json<LessonPayload>,
) -> Result<HttpResponse, ApiError> {
    modify_lesson(user, store, path.into_inner(), payload.into_inner(), false).await
}

#[patch("/lessons/{id}/")]
pub async fn partial_update_lesson(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
    payload: web::Json<LessonPayload>,
) -> Result<HttpResponse, ApiError> {
    modify_lesson(user, store, path.into_inner(), payload.into_inner(), true).await
}

#[delete("/lessons/{id}/")]
pub async fn delete_lesson(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let lesson = load_lesson(store.get_ref(), id).await?;
    check_object_permission(&user, Action::Destroy, &lesson)?;
    store.delete_lesson(id).await?;
    tracing::info!("User {} deleted lesson {}", user.id(), id);
    Ok(HttpResponse::NoContent().finish())
}
