// src/db.rs
use crate::error::{StoreError, StoreResult};
use crate::models::{CheckoutRecord, Course, Lesson, Payment, PaymentFilter, PaymentStatus, Subscription, User};
use crate::pagination::PageWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const DUPLICATE_EMAIL_MESSAGE: &str = "user with this email address already exists.";

/// Persistence for every record the API and the background jobs touch.
#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn create_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self, window: PageWindow) -> StoreResult<(Vec<User>, i64)>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// Deactivates active users whose last login is older than `cutoff`; returns how many.
    async fn deactivate_users_inactive_since(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    // Courses
    async fn create_course(&self, course: &Course) -> StoreResult<()>;
    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>>;
    async fn list_courses(&self, window: PageWindow) -> StoreResult<(Vec<Course>, i64)>;
    async fn update_course(&self, course: &Course) -> StoreResult<()>;
    async fn delete_course(&self, id: Uuid) -> StoreResult<bool>;

    // Lessons
    async fn create_lesson(&self, lesson: &Lesson) -> StoreResult<()>;
    async fn get_lesson(&self, id: Uuid) -> StoreResult<Option<Lesson>>;
    async fn list_lessons(
        &self,
        owner_id: Option<Uuid>,
        window: PageWindow,
    ) -> StoreResult<(Vec<Lesson>, i64)>;
    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()>;
    async fn delete_lesson(&self, id: Uuid) -> StoreResult<bool>;

    // Subscriptions
    /// Returns `false` when the (user, course) pair was already subscribed.
    async fn subscribe(&self, subscription: &Subscription) -> StoreResult<bool>;
    async fn unsubscribe(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<bool>;
    async fn subscribed_course_ids(
        &self,
        user_id: Uuid,
        course_ids: &[Uuid],
    ) -> StoreResult<Vec<Uuid>>;
    async fn count_subscriptions(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<i64>;
    async fn course_subscribers(&self, course_id: Uuid) -> StoreResult<Vec<User>>;

    // Payments
    async fn create_payment(&self, payment: &Payment) -> StoreResult<()>;
    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    async fn list_payments(
        &self,
        user_id: Option<Uuid>,
        filter: &PaymentFilter,
        window: PageWindow,
    ) -> StoreResult<(Vec<Payment>, i64)>;
    async fn attach_checkout(&self, id: Uuid, checkout: &CheckoutRecord) -> StoreResult<()>;
    /// Moves a pending payment to `status`. `None` when the payment is missing or already settled.
    async fn settle_payment(&self, id: Uuid, status: PaymentStatus) -> StoreResult<Option<Payment>>;
}

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        PgStorage { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
        Ok(PgStorage { pool })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, city, avatar, \
     is_active, is_staff, is_superuser, groups, last_login, date_joined";

const COURSE_COLUMNS: &str =
    "id, title, preview, description, video_link, price, owner_id, created_at, updated_at";

const LESSON_COLUMNS: &str =
    "id, course_id, title, description, preview, video_link, owner_id, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, user_id, course_id, lesson_id, amount, payment_method, status, \
     stripe_product_id, stripe_price_id, stripe_session_id, payment_url, payment_date, updated_at";

fn push_payment_filters<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    user_id: Option<Uuid>,
    filter: &'a PaymentFilter,
) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(course_id) = filter.paid_course {
        qb.push(" AND course_id = ").push_bind(course_id);
    }
    if let Some(lesson_id) = filter.paid_lesson {
        qb.push(" AND lesson_id = ").push_bind(lesson_id);
    }
    if let Some(method) = filter.payment_method {
        qb.push(" AND payment_method = ").push_bind(method.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, phone, city, avatar, \
             is_active, is_staff, is_superuser, groups, last_login, date_joined) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.city)
        .bind(&user.avatar)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(&user.groups)
        .bind(user.last_login)
        .bind(user.date_joined)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict {
                    field: "email",
                    message: DUPLICATE_EMAIL_MESSAGE.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, window: PageWindow) -> StoreResult<(Vec<User>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY email LIMIT $1 OFFSET $2",
            USER_COLUMNS
        ))
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((users, total))
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET first_name = $2, last_name = $3, phone = $4, city = $5, avatar = $6, \
             is_active = $7, is_staff = $8, is_superuser = $9, groups = $10, password_hash = $11 \
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.city)
        .bind(&user.avatar)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(&user.groups)
        .bind(&user.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_users_inactive_since(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE users SET is_active = FALSE WHERE is_active = TRUE AND last_login < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_course(&self, course: &Course) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO courses (id, title, preview, description, video_link, price, owner_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.preview)
        .bind(&course.description)
        .bind(&course.video_link)
        .bind(course.price)
        .bind(course.owner_id)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(&format!(
            "SELECT {} FROM courses WHERE id = $1",
            COURSE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    async fn list_courses(&self, window: PageWindow) -> StoreResult<(Vec<Course>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await?;
        let courses = sqlx::query_as::<_, Course>(&format!(
            "SELECT {} FROM courses ORDER BY created_at, id LIMIT $1 OFFSET $2",
            COURSE_COLUMNS
        ))
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((courses, total))
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        sqlx::query(
            "UPDATE courses SET title = $2, preview = $3, description = $4, video_link = $5, \
             price = $6, owner_id = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.preview)
        .bind(&course.description)
        .bind(&course.video_link)
        .bind(course.price)
        .bind(course.owner_id)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_course(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO lessons (id, course_id, title, description, preview, video_link, owner_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(lesson.id)
        .bind(lesson.course_id)
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.preview)
        .bind(&lesson.video_link)
        .bind(lesson.owner_id)
        .bind(lesson.created_at)
        .bind(lesson.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lesson(&self, id: Uuid) -> StoreResult<Option<Lesson>> {
        let lesson = sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {} FROM lessons WHERE id = $1",
            LESSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lesson)
    }

    async fn list_lessons(
        &self,
        owner_id: Option<Uuid>,
        window: PageWindow,
    ) -> StoreResult<(Vec<Lesson>, i64)> {
        // NULL owner filter means "every lesson"
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE ($1::uuid IS NULL OR owner_id = $1)")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?;
        let lessons = sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {} FROM lessons WHERE ($1::uuid IS NULL OR owner_id = $1) \
             ORDER BY created_at, id LIMIT $2 OFFSET $3",
            LESSON_COLUMNS
        ))
        .bind(owner_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((lessons, total))
    }

    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        sqlx::query(
            "UPDATE lessons SET course_id = $2, title = $3, description = $4, preview = $5, \
             video_link = $6, owner_id = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(lesson.id)
        .bind(lesson.course_id)
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.preview)
        .bind(&lesson.video_link)
        .bind(lesson.owner_id)
        .bind(lesson.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_lesson(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscribe(&self, subscription: &Subscription) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO subscriptions (id, user_id, course_id, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, course_id) DO NOTHING",
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.course_id)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unsubscribe(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscribed_course_ids(
        &self,
        user_id: Uuid,
        course_ids: &[Uuid],
    ) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT course_id FROM subscriptions WHERE user_id = $1 AND course_id = ANY($2)",
        )
        .bind(user_id)
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_subscriptions(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn course_subscribers(&self, course_id: Uuid) -> StoreResult<Vec<User>> {
        let columns = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM subscriptions s JOIN users u ON u.id = s.user_id \
             WHERE s.course_id = $1 ORDER BY s.created_at",
            columns
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_payment(&self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, user_id, course_id, lesson_id, amount, payment_method, status, \
             stripe_product_id, stripe_price_id, stripe_session_id, payment_url, payment_date, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.course_id)
        .bind(payment.lesson_id)
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.stripe_product_id)
        .bind(&payment.stripe_price_id)
        .bind(&payment.stripe_session_id)
        .bind(&payment.payment_url)
        .bind(payment.payment_date)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn list_payments(
        &self,
        user_id: Option<Uuid>,
        filter: &PaymentFilter,
        window: PageWindow,
    ) -> StoreResult<(Vec<Payment>, i64)> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM payments");
        push_payment_filters(&mut count_query, user_id, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM payments", PAYMENT_COLUMNS));
        push_payment_filters(&mut query, user_id, filter);
        query.push(if filter.newest_first() {
            " ORDER BY payment_date DESC, id"
        } else {
            " ORDER BY payment_date ASC, id"
        });
        query.push(" LIMIT ").push_bind(window.limit());
        query.push(" OFFSET ").push_bind(window.offset());
        let payments = query
            .build_query_as::<Payment>()
            .fetch_all(&self.pool)
            .await?;
        Ok((payments, total))
    }

    async fn attach_checkout(&self, id: Uuid, checkout: &CheckoutRecord) -> StoreResult<()> {
        sqlx::query(
            "UPDATE payments SET stripe_product_id = $2, stripe_price_id = $3, stripe_session_id = $4, \
             payment_url = $5, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(&checkout.product_id)
        .bind(&checkout.price_id)
        .bind(&checkout.session_id)
        .bind(&checkout.payment_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn settle_payment(&self, id: Uuid, status: PaymentStatus) -> StoreResult<Option<Payment>> {
        if !PaymentStatus::Pending.can_transition_to(status) {
            return Ok(None);
        }
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }
}
