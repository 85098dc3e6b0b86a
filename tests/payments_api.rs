// tests/payments_api.rs
mod common;

use actix_web::http::{StatusCode, header};
use actix_web::{App, test};
use common::{FRONTEND_URL, TestContext};
use lms_backend::configure_app;
use lms_backend::db::Storage;
use lms_backend::models::PaymentStatus;
use serde_json::{Value, json};
use uuid::Uuid;

#[actix_web::test]
async fn create_payment_opens_checkout_session() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let user = ctx.user("buyer@example.com").await;
    let course = ctx.course(&user, "Paid course", Some(15000.0)).await;

    let req = test::TestRequest::post()
        .uri("/payments/")
        .insert_header(ctx.bearer(&user))
        .set_json(json!({"course_id": course.id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payment_method"], "stripe");
    assert_eq!(body["paid_course"], json!(course.id));
    assert_eq!(body["stripe_session_id"], "cs_test");
    assert_eq!(body["payment_url"], "https://checkout.stripe.test/cs_test");

    assert_eq!(ctx.gateway.unit_amounts(), vec![1_500_000]);
    assert_eq!(
        ctx.gateway.products(),
        vec![("Paid course".to_string(), Some("Learn things".to_string()))]
    );
    let id = body["id"].as_str().unwrap();
    let (success, cancel) = ctx.gateway.redirect_urls()[0].clone();
    assert_eq!(success, format!("http://testserver/payments/{}/success/", id));
    assert_eq!(cancel, format!("http://testserver/payments/{}/cancel/", id));
}

#[actix_web::test]
async fn course_without_price_cannot_be_bought() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let user = ctx.user("buyer@example.com").await;
    let course = ctx.course(&user, "Free course", None).await;

    let req = test::TestRequest::post()
        .uri("/payments/")
        .insert_header(ctx.bearer(&user))
        .set_json(json!({"course_id": course.id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/payments/")
        .insert_header(ctx.bearer(&user))
        .set_json(json!({"course_id": Uuid::new_v4()}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.gateway.products().is_empty());
}

#[actix_web::test]
async fn gateway_failure_marks_payment_failed() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let user = ctx.user("buyer@example.com").await;
    let course = ctx.course(&user, "Paid course", Some(100.0)).await;
    ctx.gateway.fail_with("Invalid API Key provided");

    let req = test::TestRequest::post()
        .uri("/payments/")
        .insert_header(ctx.bearer(&user))
        .set_json(json!({"course_id": course.id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("Invalid API Key provided")
    );

    let req = test::TestRequest::get()
        .uri("/payments/")
        .insert_header(ctx.bearer(&user))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["status"], "failed");
}

#[actix_web::test]
async fn polling_settles_paid_session() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let user = ctx.user("buyer@example.com").await;
    let id = ctx.pending_payment(&user).await.id.to_string();

    ctx.gateway.set_session("open", "unpaid");
    let req = test::TestRequest::get()
        .uri(&format!("/payments/{}/", id))
        .insert_header(ctx.bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "pending");

    ctx.gateway.set_session("complete", "paid");
    let req = test::TestRequest::get()
        .uri(&format!("/payments/{}/", id))
        .insert_header(ctx.bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "paid");

    // terminal states never change, even if the session later expires
    ctx.gateway.set_session("expired", "unpaid");
    let req = test::TestRequest::get()
        .uri(&format!("/payments/{}/", id))
        .insert_header(ctx.bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "paid");
}

#[actix_web::test]
async fn expired_session_fails_payment() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let user = ctx.user("buyer@example.com").await;
    let id = ctx.pending_payment(&user).await.id.to_string();

    ctx.gateway.set_session("expired", "unpaid");
    let req = test::TestRequest::get()
        .uri(&format!("/payments/{}/", id))
        .insert_header(ctx.bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "failed");

    let stored = ctx
        .store
        .get_payment(id.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
}

#[actix_web::test]
async fn other_users_cannot_poll_payment() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let buyer = ctx.user("buyer@example.com").await;
    let stranger = ctx.user("stranger@example.com").await;
    let admin = ctx.staff("admin@example.com").await;
    let id = ctx.pending_payment(&buyer).await.id.to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/payments/{}/", id))
        .insert_header(ctx.bearer(&stranger))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&format!("/payments/{}/", id))
        .insert_header(ctx.bearer(&admin))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn payment_list_is_scoped_and_filtered() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let buyer = ctx.user("buyer@example.com").await;
    let other = ctx.user("other@example.com").await;
    let admin = ctx.staff("admin@example.com").await;
    ctx.pending_payment(&buyer).await;
    let paid = ctx.pending_payment(&buyer).await.id.to_string();
    ctx.pending_payment(&other).await;

    ctx.store
        .settle_payment(paid.parse().unwrap(), PaymentStatus::Paid)
        .await
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/payments/")
        .insert_header(ctx.bearer(&buyer))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 2);

    let req = test::TestRequest::get()
        .uri("/payments/?status=paid")
        .insert_header(ctx.bearer(&buyer))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["id"], paid.as_str());

    let req = test::TestRequest::get()
        .uri("/payments/?payment_method=stripe")
        .insert_header(ctx.bearer(&admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 3);

    let req = test::TestRequest::get()
        .uri("/payments/?status=refunded")
        .insert_header(ctx.bearer(&admin))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn success_and_cancel_redirect_to_frontend() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.services))).await;
    let id = Uuid::new_v4();

    for (path, suffix) in [("success", "/payment/success"), ("cancel", "/payment/cancel")] {
        let req = test::TestRequest::get()
            .uri(&format!("/payments/{}/{}/", id, path))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
        assert_eq!(location, format!("{}{}", FRONTEND_URL, suffix));
    }
}
