// src/memory.rs
use crate::db::{DUPLICATE_EMAIL_MESSAGE, Storage};
use crate::error::{StoreError, StoreResult};
use crate::models::{CheckoutRecord, Course, Lesson, Payment, PaymentFilter, PaymentStatus, Subscription, User};
use crate::pagination::PageWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    courses: Vec<Course>,
    lessons: Vec<Lesson>,
    subscriptions: Vec<Subscription>,
    payments: Vec<Payment>,
}

/// In-memory storage for development and tests. Rows keep insertion order.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn window_of<T: Clone>(rows: &[T], window: PageWindow) -> (Vec<T>, i64) {
    let page = rows
        .iter()
        .skip(window.offset() as usize)
        .take(window.limit() as usize)
        .cloned()
        .collect();
    (page, rows.len() as i64)
}

fn replace<T>(rows: &mut [T], row: &T, same: impl Fn(&T) -> bool)
where
    T: Clone,
{
    if let Some(slot) = rows.iter_mut().find(|r| same(r)) {
        *slot = row.clone();
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict {
                field: "email",
                message: DUPLICATE_EMAIL_MESSAGE.to_string(),
            });
        }
        tables.users.push(user.clone());
        debug!("Created user {} with id {}", user.email, user.id);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .tables
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self, window: PageWindow) -> StoreResult<(Vec<User>, i64)> {
        let mut users = self.tables.lock().users.clone();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(window_of(&users, window))
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        replace(&mut tables.users, user, |u| u.id == user.id);
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }
        for course in tables.courses.iter_mut().filter(|c| c.owner_id == Some(id)) {
            course.owner_id = None;
        }
        for lesson in tables.lessons.iter_mut().filter(|l| l.owner_id == Some(id)) {
            lesson.owner_id = None;
        }
        tables.subscriptions.retain(|s| s.user_id != id);
        tables.payments.retain(|p| p.user_id != id);
        Ok(true)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(user) = self.tables.lock().users.iter_mut().find(|u| u.id == id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn deactivate_users_inactive_since(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.lock();
        let mut count = 0;
        for user in tables.users.iter_mut() {
            let stale = user.last_login.is_some_and(|at| at < cutoff);
            if user.is_active && stale {
                user.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn create_course(&self, course: &Course) -> StoreResult<()> {
        self.tables.lock().courses.push(course.clone());
        debug!("Created course {} with id {}", course.title, course.id);
        Ok(())
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.tables.lock().courses.iter().find(|c| c.id == id).cloned())
    }

    async fn list_courses(&self, window: PageWindow) -> StoreResult<(Vec<Course>, i64)> {
        Ok(window_of(&self.tables.lock().courses, window))
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        replace(&mut tables.courses, course, |c| c.id == course.id);
        Ok(())
    }

    async fn delete_course(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let before = tables.courses.len();
        tables.courses.retain(|c| c.id != id);
        if tables.courses.len() == before {
            return Ok(false);
        }
        let removed_lessons: Vec<Uuid> = tables
            .lessons
            .iter()
            .filter(|l| l.course_id == id)
            .map(|l| l.id)
            .collect();
        tables.lessons.retain(|l| l.course_id != id);
        tables.subscriptions.retain(|s| s.course_id != id);
        for payment in tables.payments.iter_mut() {
            if payment.course_id == Some(id) {
                payment.course_id = None;
            }
            if payment.lesson_id.is_some_and(|l| removed_lessons.contains(&l)) {
                payment.lesson_id = None;
            }
        }
        Ok(true)
    }

    async fn create_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        self.tables.lock().lessons.push(lesson.clone());
        debug!("Created lesson {} with id {}", lesson.title, lesson.id);
        Ok(())
    }

    async fn get_lesson(&self, id: Uuid) -> StoreResult<Option<Lesson>> {
        Ok(self.tables.lock().lessons.iter().find(|l| l.id == id).cloned())
    }

    async fn list_lessons(
        &self,
        owner_id: Option<Uuid>,
        window: PageWindow,
    ) -> StoreResult<(Vec<Lesson>, i64)> {
        let tables = self.tables.lock();
        let lessons: Vec<Lesson> = tables
            .lessons
            .iter()
            .filter(|l| owner_id.is_none() || l.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(window_of(&lessons, window))
    }

    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        replace(&mut tables.lessons, lesson, |l| l.id == lesson.id);
        Ok(())
    }

    async fn delete_lesson(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let before = tables.lessons.len();
        tables.lessons.retain(|l| l.id != id);
        for payment in tables.payments.iter_mut().filter(|p| p.lesson_id == Some(id)) {
            payment.lesson_id = None;
        }
        Ok(tables.lessons.len() < before)
    }

    async fn subscribe(&self, subscription: &Subscription) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let exists = tables.subscriptions.iter().any(|s| {
            s.user_id == subscription.user_id && s.course_id == subscription.course_id
        });
        if exists {
            return Ok(false);
        }
        tables.subscriptions.push(subscription.clone());
        Ok(true)
    }

    async fn unsubscribe(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let before = tables.subscriptions.len();
        tables
            .subscriptions
            .retain(|s| !(s.user_id == user_id && s.course_id == course_id));
        Ok(tables.subscriptions.len() < before)
    }

    async fn subscribed_course_ids(
        &self,
        user_id: Uuid,
        course_ids: &[Uuid],
    ) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && course_ids.contains(&s.course_id))
            .map(|s| s.course_id)
            .collect())
    }

    async fn count_subscriptions(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .tables
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.course_id == course_id)
            .count() as i64)
    }

    async fn course_subscribers(&self, course_id: Uuid) -> StoreResult<Vec<User>> {
        let tables = self.tables.lock();
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.course_id == course_id)
            .filter_map(|s| tables.users.iter().find(|u| u.id == s.user_id).cloned())
            .collect())
    }

    async fn create_payment(&self, payment: &Payment) -> StoreResult<()> {
        self.tables.lock().payments.push(payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.lock().payments.iter().find(|p| p.id == id).cloned())
    }

    async fn list_payments(
        &self,
        user_id: Option<Uuid>,
        filter: &PaymentFilter,
        window: PageWindow,
    ) -> StoreResult<(Vec<Payment>, i64)> {
        let mut payments: Vec<Payment> = self
            .tables
            .lock()
            .payments
            .iter()
            .filter(|p| user_id.is_none_or(|u| p.user_id == u))
            .filter(|p| filter.paid_course.is_none_or(|c| p.course_id == Some(c)))
            .filter(|p| filter.paid_lesson.is_none_or(|l| p.lesson_id == Some(l)))
            .filter(|p| filter.payment_method.is_none_or(|m| p.payment_method == m))
            .filter(|p| filter.status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        // stable sort keeps insertion order among equal timestamps
        payments.sort_by_key(|p| p.payment_date);
        if filter.newest_first() {
            payments.reverse();
        }
        Ok(window_of(&payments, window))
    }

    async fn attach_checkout(&self, id: Uuid, checkout: &CheckoutRecord) -> StoreResult<()> {
        if let Some(payment) = self.tables.lock().payments.iter_mut().find(|p| p.id == id) {
            payment.stripe_product_id = Some(checkout.product_id.clone());
            payment.stripe_price_id = Some(checkout.price_id.clone());
            payment.stripe_session_id = Some(checkout.session_id.clone());
            payment.payment_url = checkout.payment_url.clone();
            payment.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn settle_payment(&self, id: Uuid, status: PaymentStatus) -> StoreResult<Option<Payment>> {
        let mut tables = self.tables.lock();
        match tables.payments.iter_mut().find(|p| p.id == id) {
            Some(payment) if payment.status.can_transition_to(status) => {
                payment.status = status;
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMethod;
    use chrono::Duration;

    fn window(page: u32, page_size: u32) -> PageWindow {
        PageWindow { page, page_size }
    }

    fn course(owner: Option<Uuid>) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: "Rust".into(),
            preview: None,
            description: None,
            video_link: None,
            price: Some(100.0),
            owner_id: owner,
            created_at: now,
            updated_at: now,
        }
    }

    fn payment(user_id: Uuid) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            user_id,
            course_id: None,
            lesson_id: None,
            amount: 10.0,
            payment_method: PaymentMethod::Stripe,
            status: PaymentStatus::Pending,
            stripe_product_id: None,
            stripe_price_id: None,
            stripe_session_id: None,
            payment_url: None,
            payment_date: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = InMemoryStorage::new();
        store.create_user(&User::new("a@example.com", "x".into())).await.unwrap();
        let err = store
            .create_user(&User::new("A@example.com", "y".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "email", .. }));
    }

    #[tokio::test]
    async fn subscribe_is_unique_per_pair() {
        let store = InMemoryStorage::new();
        let user = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let sub = |id| Subscription {
            id,
            user_id: user,
            course_id,
            created_at: Utc::now(),
        };
        assert!(store.subscribe(&sub(Uuid::new_v4())).await.unwrap());
        assert!(!store.subscribe(&sub(Uuid::new_v4())).await.unwrap());
        assert_eq!(store.count_subscriptions(user, course_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_owner_orphans_courses() {
        let store = InMemoryStorage::new();
        let owner = User::new("owner@example.com", "x".into());
        store.create_user(&owner).await.unwrap();
        let c = course(Some(owner.id));
        store.create_course(&c).await.unwrap();

        assert!(store.delete_user(owner.id).await.unwrap());
        let reloaded = store.get_course(c.id).await.unwrap().unwrap();
        assert_eq!(reloaded.owner_id, None);
    }

    #[tokio::test]
    async fn deleting_course_cascades_lessons_and_subscriptions() {
        let store = InMemoryStorage::new();
        let c = course(None);
        store.create_course(&c).await.unwrap();
        let now = Utc::now();
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id: c.id,
            title: "One".into(),
            description: None,
            preview: None,
            video_link: None,
            owner_id: None,
            created_at: now,
            updated_at: now,
        };
        store.create_lesson(&lesson).await.unwrap();
        let user_id = Uuid::new_v4();
        store
            .subscribe(&Subscription {
                id: Uuid::new_v4(),
                user_id,
                course_id: c.id,
                created_at: now,
            })
            .await
            .unwrap();

        assert!(store.delete_course(c.id).await.unwrap());
        assert!(store.get_lesson(lesson.id).await.unwrap().is_none());
        assert_eq!(store.count_subscriptions(user_id, c.id).await.unwrap(), 0);
        assert!(!store.delete_course(c.id).await.unwrap());
    }

    #[tokio::test]
    async fn settled_payments_never_regress() {
        let store = InMemoryStorage::new();
        let p = payment(Uuid::new_v4());
        store.create_payment(&p).await.unwrap();

        let paid = store.settle_payment(p.id, PaymentStatus::Paid).await.unwrap();
        assert_eq!(paid.map(|p| p.status), Some(PaymentStatus::Paid));
        assert!(store.settle_payment(p.id, PaymentStatus::Failed).await.unwrap().is_none());
        assert!(store.settle_payment(p.id, PaymentStatus::Pending).await.unwrap().is_none());
        assert_eq!(
            store.get_payment(p.id).await.unwrap().unwrap().status,
            PaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn payments_filter_and_order() {
        let store = InMemoryStorage::new();
        let user = Uuid::new_v4();
        let mut older = payment(user);
        older.payment_date = Utc::now() - Duration::days(1);
        older.payment_method = PaymentMethod::Cash;
        let newer = payment(user);
        store.create_payment(&older).await.unwrap();
        store.create_payment(&newer).await.unwrap();
        store.create_payment(&payment(Uuid::new_v4())).await.unwrap();

        let (mine, total) = store
            .list_payments(Some(user), &PaymentFilter::default(), window(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(mine[0].id, newer.id);

        let oldest_first = PaymentFilter {
            ordering: Some("payment_date".into()),
            ..PaymentFilter::default()
        };
        let (mine, _) = store
            .list_payments(Some(user), &oldest_first, window(1, 10))
            .await
            .unwrap();
        assert_eq!(mine[0].id, older.id);

        let cash = PaymentFilter {
            payment_method: Some(PaymentMethod::Cash),
            ..PaymentFilter::default()
        };
        let (all_cash, total) = store.list_payments(None, &cash, window(1, 10)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(all_cash[0].id, older.id);
    }

    #[tokio::test]
    async fn lessons_window_and_owner_filter() {
        let store = InMemoryStorage::new();
        let c = course(None);
        let owner = Uuid::new_v4();
        for i in 0..7 {
            let now = Utc::now();
            store
                .create_lesson(&Lesson {
                    id: Uuid::new_v4(),
                    course_id: c.id,
                    title: format!("Lesson {}", i),
                    description: None,
                    preview: None,
                    video_link: None,
                    owner_id: if i % 2 == 0 { Some(owner) } else { None },
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let (page, total) = store.list_lessons(None, window(2, 5)).await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(page.len(), 2);

        let (own, total) = store.list_lessons(Some(owner), window(1, 10)).await.unwrap();
        assert_eq!(total, 4);
        assert!(own.iter().all(|l| l.owner_id == Some(owner)));
    }
}
