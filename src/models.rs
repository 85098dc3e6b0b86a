// src/models.rs
use crate::validators::{
    validate_no_external_links, validate_not_blank, validate_not_numeric, validate_video_link,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

pub const MODERATORS_GROUP: &str = "moderators";

#[derive(Serialize, Clone, Debug, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, password_hash: String) -> Self {
        User {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            phone: None,
            city: None,
            avatar: None,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            groups: Vec::new(),
            last_login: None,
            date_joined: Utc::now(),
        }
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub preview: Option<String>,
    pub description: Option<String>,
    pub video_link: Option<String>,
    pub price: Option<f64>,
    #[serde(rename = "owner")]
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course as returned to a particular caller.
#[derive(Serialize, Debug)]
pub struct CourseView {
    #[serde(flatten)]
    pub course: Course,
    pub is_subscribed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Lesson {
    pub id: Uuid,
    #[serde(rename = "course")]
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub preview: Option<String>,
    pub video_link: Option<String>,
    #[serde(rename = "owner")]
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(rename = "course")]
    pub course_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Stripe,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Stripe => "stripe",
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "transfer" => Ok(PaymentMethod::Transfer),
            "stripe" => Ok(PaymentMethod::Stripe),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Only a pending payment may settle, and only into a terminal state.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Payment {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(rename = "paid_course")]
    pub course_id: Option<Uuid>,
    #[serde(rename = "paid_lesson")]
    pub lesson_id: Option<Uuid>,
    pub amount: f64,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub payment_url: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gateway identifiers recorded once a checkout session exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRecord {
    pub product_id: String,
    pub price_id: String,
    pub session_id: String,
    pub payment_url: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PaymentFilter {
    pub paid_course: Option<Uuid>,
    pub paid_lesson: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
    pub ordering: Option<String>,
}

impl PaymentFilter {
    pub fn newest_first(&self) -> bool {
        self.ordering.as_deref() != Some("payment_date")
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Serialize, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(
        length(
            min = 8,
            message = "This password is too short. It must contain at least 8 characters."
        ),
        custom(function = "validate_not_numeric")
    )]
    pub password: String,
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: Option<String>,
    #[validate(length(max = 15, message = "Ensure this field has no more than 15 characters."))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub city: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Validate)]
pub struct UserPayload {
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: Option<String>,
    #[validate(length(max = 15, message = "Ensure this field has no more than 15 characters."))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub city: Option<String>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, Deserialize, Default, Validate)]
pub struct CoursePayload {
    #[validate(
        length(max = 255, message = "Ensure this field has no more than 255 characters."),
        custom(function = "validate_not_blank")
    )]
    pub title: Option<String>,
    pub preview: Option<String>,
    #[validate(custom(function = "validate_no_external_links"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_video_link"))]
    pub video_link: Option<String>,
    #[validate(range(min = 0.0, message = "Ensure this value is greater than or equal to 0."))]
    pub price: Option<f64>,
}

#[derive(Serialize, Deserialize, Default, Validate)]
pub struct LessonPayload {
    pub course: Option<Uuid>,
    #[validate(
        length(max = 255, message = "Ensure this field has no more than 255 characters."),
        custom(function = "validate_not_blank")
    )]
    pub title: Option<String>,
    #[validate(custom(function = "validate_no_external_links"))]
    pub description: Option<String>,
    pub preview: Option<String>,
    #[validate(custom(function = "validate_video_link"))]
    pub video_link: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CourseRef {
    pub course_id: Option<Uuid>,
}
