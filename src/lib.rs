// src/lib.rs
use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

pub mod auth;
pub mod config;
pub mod courses;
pub mod db;
pub mod error;
pub mod gateway;
pub mod lessons;
pub mod mailer;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod payments;
pub mod permissions;
pub mod subscriptions;
pub mod tasks;
pub mod users;
pub mod validators;

use config::Config;
use courses::CourseCache;
use db::Storage;
use error::ApiError;
use gateway::PaymentGateway;
use tasks::TaskQueue;

const COURSE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Everything the HTTP layer shares across workers.
#[derive(Clone)]
pub struct AppServices {
    pub config: Config,
    pub store: Arc<dyn Storage>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tasks: TaskQueue,
    pub course_cache: CourseCache,
}

pub fn course_cache(config: &Config) -> CourseCache {
    CourseCache::builder()
        .max_capacity(config.course_cache_capacity)
        .time_to_live(COURSE_CACHE_TTL)
        .support_invalidation_closures()
        .build()
}

pub fn configure_app(cfg: &mut web::ServiceConfig, services: &AppServices) {
    cfg.app_data(web::Data::new(services.config.clone()))
        .app_data(web::Data::from(services.store.clone()))
        .app_data(web::Data::from(services.gateway.clone()))
        .app_data(web::Data::new(services.tasks.clone()))
        .app_data(web::Data::new(services.course_cache.clone()))
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            tracing::debug!("Rejected JSON body: {}", err);
            ApiError::BadRequest(err.to_string()).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            ApiError::BadRequest(err.to_string()).into()
        }))
        .configure(auth::init_routes)
        .configure(users::init_routes)
        .configure(courses::init_routes)
        .configure(lessons::init_routes)
        .configure(subscriptions::init_routes)
        .configure(payments::init_routes);
}
