// tests/common/mod.rs
#![allow(dead_code)]

use actix_web::http::header;
use async_trait::async_trait;
use chrono::Utc;
use lms_backend::auth::issue_token;
use lms_backend::config::Config;
use lms_backend::db::Storage;
use lms_backend::error::GatewayError;
use lms_backend::gateway::{CheckoutSession, PaymentGateway, Price, Product};
use lms_backend::memory::InMemoryStorage;
use lms_backend::models::{
    CheckoutRecord, Course, Lesson, MODERATORS_GROUP, Payment, PaymentMethod, PaymentStatus,
    TokenType, User,
};
use lms_backend::tasks::{Task, TaskQueue};
use lms_backend::{AppServices, course_cache};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const PASSWORD: &str = "s3cret-pass";
pub const FRONTEND_URL: &str = "http://frontend.test";

pub fn test_config() -> Config {
    let vars = [
        ("JWT_SECRET", "integration-secret"),
        ("STORAGE", "memory"),
        ("BCRYPT_COST", "4"),
        ("PUBLIC_URL", "http://testserver"),
        ("FRONTEND_URL", FRONTEND_URL),
        ("SITE_NAME", "Test Platform"),
    ];
    envy::from_iter(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
        .expect("test config")
}

/// Gateway double with a scripted session state and an optional failure.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    failure: Option<String>,
    session_status: Option<String>,
    payment_status: Option<String>,
    products: Vec<(String, Option<String>)>,
    unit_amounts: Vec<i64>,
    redirect_urls: Vec<(String, String)>,
}

impl FakeGateway {
    pub fn fail_with(&self, message: &str) {
        self.state.lock().failure = Some(message.to_string());
    }

    pub fn set_session(&self, status: &str, payment_status: &str) {
        let mut state = self.state.lock();
        state.session_status = Some(status.to_string());
        state.payment_status = Some(payment_status.to_string());
    }

    pub fn products(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().products.clone()
    }

    pub fn unit_amounts(&self) -> Vec<i64> {
        self.state.lock().unit_amounts.clone()
    }

    pub fn redirect_urls(&self) -> Vec<(String, String)> {
        self.state.lock().redirect_urls.clone()
    }

    fn check(&self) -> Result<(), GatewayError> {
        match &self.state.lock().failure {
            Some(message) => Err(GatewayError::Api {
                status: 402,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
        _course_id: Uuid,
    ) -> Result<Product, GatewayError> {
        self.check()?;
        self.state
            .lock()
            .products
            .push((name.to_string(), description.map(str::to_string)));
        Ok(Product {
            id: "prod_test".into(),
        })
    }

    async fn create_price(&self, _product_id: &str, unit_amount: i64) -> Result<Price, GatewayError> {
        self.check()?;
        self.state.lock().unit_amounts.push(unit_amount);
        Ok(Price {
            id: "price_test".into(),
        })
    }

    async fn create_session(
        &self,
        _price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        self.check()?;
        self.state
            .lock()
            .redirect_urls
            .push((success_url.to_string(), cancel_url.to_string()));
        Ok(CheckoutSession {
            id: "cs_test".into(),
            url: Some("https://checkout.stripe.test/cs_test".into()),
            status: Some("open".into()),
            payment_status: Some("unpaid".into()),
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.check()?;
        let state = self.state.lock();
        Ok(CheckoutSession {
            id: session_id.to_string(),
            url: None,
            status: state.session_status.clone(),
            payment_status: state.payment_status.clone(),
        })
    }
}

pub struct TestContext {
    pub config: Config,
    pub store: Arc<InMemoryStorage>,
    pub gateway: Arc<FakeGateway>,
    pub tasks: UnboundedReceiver<Task>,
    pub services: AppServices,
}

impl TestContext {
    pub fn new() -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryStorage::new());
        let gateway = Arc::new(FakeGateway::default());
        let (queue, tasks) = TaskQueue::channel();
        let services = AppServices {
            config: config.clone(),
            store: store.clone(),
            gateway: gateway.clone(),
            tasks: queue,
            course_cache: course_cache(&config),
        };
        TestContext {
            config,
            store,
            gateway,
            tasks,
            services,
        }
    }

    pub async fn user(&self, email: &str) -> User {
        let hash = bcrypt::hash(PASSWORD, 4).expect("hash");
        let user = User::new(email, hash);
        self.store.create_user(&user).await.expect("create user");
        user
    }

    pub async fn staff(&self, email: &str) -> User {
        let mut user = self.user(email).await;
        user.is_staff = true;
        self.store.update_user(&user).await.expect("update user");
        user
    }

    pub async fn moderator(&self, email: &str) -> User {
        let mut user = self.user(email).await;
        user.groups.push(MODERATORS_GROUP.to_string());
        self.store.update_user(&user).await.expect("update user");
        user
    }

    pub fn bearer(&self, user: &User) -> (header::HeaderName, String) {
        let token = issue_token(&self.config, user, TokenType::Access).expect("token");
        (header::AUTHORIZATION, format!("Bearer {}", token))
    }

    pub async fn course(&self, owner: &User, title: &str, price: Option<f64>) -> Course {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            title: title.to_string(),
            preview: None,
            description: Some("Learn things".into()),
            video_link: None,
            price,
            owner_id: Some(owner.id),
            created_at: now,
            updated_at: now,
        };
        self.store.create_course(&course).await.expect("create course");
        course
    }

    pub async fn lesson(&self, course: &Course, owner: &User, title: &str) -> Lesson {
        let now = Utc::now();
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id: course.id,
            title: title.to_string(),
            description: None,
            preview: None,
            video_link: Some("https://www.youtube.com/watch?v=abc".into()),
            owner_id: Some(owner.id),
            created_at: now,
            updated_at: now,
        };
        self.store.create_lesson(&lesson).await.expect("create lesson");
        lesson
    }

    /// Stripe payment with an open checkout session, as after `POST /payments/`.
    pub async fn pending_payment(&self, user: &User) -> Payment {
        let course = self.course(user, "Paid course", Some(99.9)).await;
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: user.id,
            course_id: Some(course.id),
            lesson_id: None,
            amount: 99.9,
            payment_method: PaymentMethod::Stripe,
            status: PaymentStatus::Pending,
            stripe_product_id: None,
            stripe_price_id: None,
            stripe_session_id: None,
            payment_url: None,
            payment_date: now,
            updated_at: now,
        };
        self.store.create_payment(&payment).await.expect("create payment");
        let checkout = CheckoutRecord {
            product_id: "prod_test".into(),
            price_id: "price_test".into(),
            session_id: "cs_test".into(),
            payment_url: Some("https://checkout.stripe.test/cs_test".into()),
        };
        self.store
            .attach_checkout(payment.id, &checkout)
            .await
            .expect("attach checkout");
        self.store
            .get_payment(payment.id)
            .await
            .expect("get payment")
            .expect("payment exists")
    }
}
