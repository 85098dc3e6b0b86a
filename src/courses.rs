// src/courses.rs
use crate::auth::AuthUser;
use crate::db::Storage;
use crate::error::ApiError;
use crate::models::{Course, CoursePayload, CourseView};
use crate::pagination::{COURSE_PAGINATOR, PageParams};
use crate::permissions::{Action, check_object_permission};
use crate::tasks::{Task, TaskQueue};
use crate::validators::FieldCheck;
use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, put, web};
use chrono::Utc;
use moka::future::Cache;
use uuid::Uuid;

pub type CourseCache = Cache<Uuid, Course>;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_courses);
    cfg.service(create_course);
    cfg.service(get_course);
    cfg.service(update_course);
    cfg.service(partial_update_course);
    cfg.service(delete_course);
}

fn validate(payload: &CoursePayload, partial: bool) -> Result<(), ApiError> {
    let mut check = FieldCheck::of(payload);
    if !partial {
        check.require("title", &payload.title);
    }
    check.finish()
}

fn apply(course: &mut Course, payload: CoursePayload, partial: bool) {
    if let Some(title) = payload.title {
        course.title = title.trim().to_string();
    }
    if partial {
        if payload.preview.is_some() {
            course.preview = payload.preview;
        }
        if payload.description.is_some() {
            course.description = payload.description;
        }
        if payload.video_link.is_some() {
            course.video_link = payload.video_link;
        }
        if payload.price.is_some() {
            course.price = payload.price;
        }
    } else {
        course.preview = payload.preview;
        course.description = payload.description;
        course.video_link = payload.video_link;
        course.price = payload.price;
    }
    course.updated_at = Utc::now();
}

async fn load_course(
    store: &dyn Storage,
    cache: &CourseCache,
    id: Uuid,
) -> Result<Course, ApiError> {
    if let Some(course) = cache.get(&id).await {
        tracing::debug!("Cache hit for course {}", id);
        return Ok(course);
    }
    let course = store
        .get_course(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course"))?;
    cache.insert(id, course.clone()).await;
    Ok(course)
}

async fn view_for(
    store: &dyn Storage,
    user: &AuthUser,
    course: Course,
) -> Result<CourseView, ApiError> {
    let subscribed = store.count_subscriptions(user.id(), course.id).await? > 0;
    Ok(CourseView {
        course,
        is_subscribed: subscribed,
    })
}

#[get("/courses/")]
pub async fn list_courses(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    params: web::Query<PageParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let window = COURSE_PAGINATOR.window(&params)?;
    let (courses, total) = store.list_courses(window).await?;

    let ids: Vec<Uuid> = courses.iter().map(|c| c.id).collect();
    let subscribed = store.subscribed_course_ids(user.id(), &ids).await?;
    let views: Vec<CourseView> = courses
        .into_iter()
        .map(|course| CourseView {
            is_subscribed: subscribed.contains(&course.id),
            course,
        })
        .collect();

    let page = COURSE_PAGINATOR.page(window, total, views, &req)?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/courses/")]
pub async fn create_course(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    payload: web::Json<CoursePayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validate(&payload, false)?;

    let now = Utc::now();
    let mut course = Course {
        id: Uuid::new_v4(),
        title: String::new(),
        preview: None,
        description: None,
        video_link: None,
        price: None,
        owner_id: Some(user.id()),
        created_at: now,
        updated_at: now,
    };
    apply(&mut course, payload, false);
    store.create_course(&course).await?;
    tracing::info!("User {} created course {}", user.id(), course.id);

    Ok(HttpResponse::Created().json(CourseView {
        course,
        is_subscribed: false,
    }))
}

#[get("/courses/{id}/")]
pub async fn get_course(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    cache: web::Data<CourseCache>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let course = load_course(store.get_ref(), &cache, path.into_inner()).await?;
    let view = view_for(store.get_ref(), &user, course).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn modify_course(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    cache: web::Data<CourseCache>,
    tasks: web::Data<TaskQueue>,
    id: Uuid,
    payload: CoursePayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    let mut course = load_course(store.get_ref(), &cache, id).await?;
    let action = if partial {
        Action::PartialUpdate
    } else {
        Action::Update
    };
    check_object_permission(&user, action, &course)?;
    validate(&payload, partial)?;

    apply(&mut course, payload, partial);
    store.update_course(&course).await?;
    cache.invalidate(&id).await;
    tasks.enqueue(Task::NotifyCourseUpdate { course_id: id });
    tracing::info!("User {} updated course {}", user.id(), id);

    let view = view_for(store.get_ref(), &user, course).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[put("/courses/{id}/")]
pub async fn update_course(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    cache: web::Data<CourseCache>,
    tasks: web::Data<TaskQueue>,
    path: web::Path<Uuid>,
    payload: web::Json<CoursePayload>,
) -> Result<HttpResponse, ApiError> {
    modify_course(
        user,
        store,
        cache,
        tasks,
        path.into_inner(),
        payload.into_inner(),
        false,
    )
    .await
}

#[patch("/courses/{id}/")]
pub async fn partial_update_course(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    cache: web::Data<CourseCache>,
    tasks: web::Data<TaskQueue>,
    path: web::Path<Uuid>,
    payload: web::Json<CoursePayload>,
) -> Result<HttpResponse, ApiError> {
    modify_course(
        user,
        store,
        cache,
        tasks,
        path.into_inner(),
        payload.into_inner(),
        true,
    )
    .await
}

#[delete("/courses/{id}/")]
pub async fn delete_course(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    cache: web::Data<CourseCache>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let course = load_course(store.get_ref(), &cache, id).await?;
    check_object_permission(&user, Action::Destroy, &course)?;

    store.delete_course(id).await?;
    cache.invalidate(&id).await;
    tracing::info!("User {} deleted course {}", user.id(), id);
    Ok(HttpResponse::NoContent().finish())
}
