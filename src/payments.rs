// src/payments.rs
use crate::auth::AuthUser;
use crate::config::Config;
use crate::db::Storage;
use crate::error::ApiError;
use crate::gateway::{PaymentGateway, SessionOutcome, to_minor_units, truncate_description};
use crate::models::{
    CheckoutRecord, Course, CourseRef, Payment, PaymentFilter, PaymentMethod, PaymentStatus,
};
use crate::pagination::{DEFAULT_PAGINATOR, PageParams};
use actix_web::{HttpRequest, HttpResponse, get, http::header, post, web};
use chrono::Utc;
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_payments);
    cfg.service(create_payment);
    cfg.service(get_payment);
    cfg.service(payment_success);
    cfg.service(payment_cancel);
}

async fn priced_course(store: &dyn Storage, body: &CourseRef) -> Result<(Course, f64), ApiError> {
    let course_id = body
        .course_id
        .ok_or_else(|| ApiError::BadRequest("course_id is required".to_string()))?;
    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Course not found".to_string()))?;
    match course.price {
        Some(price) if price > 0.0 => Ok((course, price)),
        _ => Err(ApiError::BadRequest("Course has no price".to_string())),
    }
}

/// Product, price and checkout session for one course purchase.
async fn open_checkout(
    gateway: &dyn PaymentGateway,
    config: &Config,
    course: &Course,
    payment: &Payment,
) -> Result<CheckoutRecord, ApiError> {
    let description = course.description.as_deref().map(truncate_description);
    let product = gateway
        .create_product(&course.title, description, course.id)
        .await?;
    let price = gateway
        .create_price(&product.id, to_minor_units(payment.amount))
        .await?;

    let base = config.public_url.trim_end_matches('/');
    let success_url = format!("{}/payments/{}/success/", base, payment.id);
    let cancel_url = format!("{}/payments/{}/cancel/", base, payment.id);
    let session = gateway
        .create_session(&price.id, &success_url, &cancel_url)
        .await?;

    Ok(CheckoutRecord {
        product_id: product.id,
        price_id: price.id,
        session_id: session.id,
        payment_url: session.url,
    })
}

#[get("/payments/")]
pub async fn list_payments(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    filter: web::Query<PaymentFilter>,
    params: web::Query<PageParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let window = DEFAULT_PAGINATOR.window(&params)?;
    let owner_filter = (!user.is_staff).then(|| user.id());
    let (payments, total) = store.list_payments(owner_filter, &filter, window).await?;
    let page = DEFAULT_PAGINATOR.page(window, total, payments, &req)?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/payments/")]
pub async fn create_payment(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    gateway: web::Data<dyn PaymentGateway>,
    config: web::Data<Config>,
    body: web::Json<CourseRef>,
) -> Result<HttpResponse, ApiError> {
    let (course, amount) = priced_course(store.get_ref(), &body).await?;

    let now = Utc::now();
    let mut payment = Payment {
        id: Uuid::new_v4(),
        user_id: user.id(),
        course_id: Some(course.id),
        lesson_id: None,
        amount,
        payment_method: PaymentMethod::Stripe,
        status: PaymentStatus::Pending,
        stripe_product_id: None,
        stripe_price_id: None,
        stripe_session_id: None,
        payment_url: None,
        payment_date: now,
        updated_at: now,
    };
    store.create_payment(&payment).await?;

    let checkout = match open_checkout(gateway.get_ref(), &config, &course, &payment).await {
        Ok(checkout) => checkout,
        Err(e) => {
            tracing::error!("Checkout for payment {} failed: {}", payment.id, e);
            store
                .settle_payment(payment.id, PaymentStatus::Failed)
                .await?;
            return Err(e);
        }
    };
    store.attach_checkout(payment.id, &checkout).await?;

    payment.stripe_product_id = Some(checkout.product_id);
    payment.stripe_price_id = Some(checkout.price_id);
    payment.stripe_session_id = Some(checkout.session_id);
    payment.payment_url = checkout.payment_url;
    tracing::info!(
        "User {} opened payment {} for course {}",
        user.id(),
        payment.id,
        course.id
    );
    Ok(HttpResponse::Created().json(payment))
}

#[get("/payments/{id}/")]
pub async fn get_payment(
    user: AuthUser,
    store: web::Data<dyn Storage>,
    gateway: web::Data<dyn PaymentGateway>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let payment = store
        .get_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;
    if payment.user_id != user.id() && !user.is_staff {
        return Err(ApiError::forbidden());
    }

    let session_id = match (&payment.status, &payment.stripe_session_id) {
        (PaymentStatus::Pending, Some(session_id)) => session_id.clone(),
        _ => return Ok(HttpResponse::Ok().json(payment)),
    };

    // A polling failure leaves the payment pending.
    let session = gateway.retrieve_session(&session_id).await?;
    let next = match session.outcome() {
        SessionOutcome::Paid => PaymentStatus::Paid,
        SessionOutcome::Expired => PaymentStatus::Failed,
        SessionOutcome::Open => return Ok(HttpResponse::Ok().json(payment)),
    };

    let payment = match store.settle_payment(id, next).await? {
        Some(settled) => {
            tracing::info!("Payment {} settled as {}", id, settled.status);
            settled
        }
        // settled concurrently; report whatever is stored now
        None => store
            .get_payment(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Payment"))?,
    };
    Ok(HttpResponse::Ok().json(payment))
}

fn frontend_redirect(config: &Config, suffix: &str) -> HttpResponse {
    let location = format!("{}{}", config.frontend_url.trim_end_matches('/'), suffix);
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

#[get("/payments/{id}/success/")]
pub async fn payment_success(config: web::Data<Config>, path: web::Path<Uuid>) -> HttpResponse {
    tracing::info!("Checkout success redirect for payment {}", path.into_inner());
    frontend_redirect(&config, "/payment/success")
}

#[get("/payments/{id}/cancel/")]
pub async fn payment_cancel(config: web::Data<Config>, path: web::Path<Uuid>) -> HttpResponse {
    tracing::info!("Checkout cancel redirect for payment {}", path.into_inner());
    frontend_redirect(&config, "/payment/cancel")
}
