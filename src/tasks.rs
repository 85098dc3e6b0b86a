// src/tasks.rs
//! Background jobs: subscriber notifications and inactive-user deactivation.
//!
//! Handlers enqueue [`Task`]s on an unbounded channel; [`run_worker`] drains it
//! and runs each task on its own tokio task with a fixed-delay retry policy.
use crate::config::Config;
use crate::db::Storage;
use crate::error::StoreError;
use crate::mailer::{Mailer, course_update_email};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    NotifyCourseUpdate { course_id: Uuid },
    DeactivateInactiveUsers { inactive_days: i64 },
}

#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (TaskQueue { sender }, receiver)
    }

    pub fn enqueue(&self, task: Task) {
        tracing::debug!("Enqueued task {:?}", task);
        if let Err(e) = self.sender.send(task) {
            tracing::error!("Task queue is closed, dropping {:?}", e.0);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            max_retries: config.task_max_retries,
            delay: Duration::from_secs(config.task_retry_delay_secs),
        }
    }
}

pub struct TaskContext {
    pub store: Arc<dyn Storage>,
    pub mailer: Arc<dyn Mailer>,
    pub site_name: String,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Notified(NotificationReport),
    Deactivated(u64),
}

/// Emails every subscriber of the course. A failed send is logged and skipped.
pub async fn send_course_update_notification(
    store: &dyn Storage,
    mailer: &dyn Mailer,
    site_name: &str,
    course_id: Uuid,
) -> Result<NotificationReport, StoreError> {
    let Some(course) = store.get_course(course_id).await? else {
        tracing::warn!("Course {} no longer exists, skipping notification", course_id);
        return Ok(NotificationReport::default());
    };

    let subscribers = store.course_subscribers(course_id).await?;
    if subscribers.is_empty() {
        tracing::info!("No subscribers for course {}", course_id);
        return Ok(NotificationReport::default());
    }

    let mut report = NotificationReport::default();
    for user in subscribers {
        let name = format!("{} {}", user.first_name, user.last_name);
        let sent = match course_update_email(site_name, &course.title, &user.email, &name) {
            Ok(message) => mailer.send(&message).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => {
                tracing::info!("Sent update to {}", user.email);
                report.sent += 1;
            }
            Err(e) => {
                tracing::error!("Error sending to {}: {}", user.email, e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Course {} update: {} sent, {} failed",
        course_id,
        report.sent,
        report.failed
    );
    Ok(report)
}

/// Deactivates users whose last login predates `now - inactive_days`.
pub async fn deactivate_inactive_users(
    store: &dyn Storage,
    inactive_days: i64,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let cutoff = now - ChronoDuration::days(inactive_days);
    let count = store.deactivate_users_inactive_since(cutoff).await?;
    tracing::info!(
        "Deactivated {} inactive users (last login before {})",
        count,
        cutoff
    );
    Ok(count)
}

pub async fn execute(ctx: &TaskContext, task: &Task) -> Result<TaskOutcome, StoreError> {
    match task {
        Task::NotifyCourseUpdate { course_id } => send_course_update_notification(
            ctx.store.as_ref(),
            ctx.mailer.as_ref(),
            &ctx.site_name,
            *course_id,
        )
        .await
        .map(TaskOutcome::Notified),
        Task::DeactivateInactiveUsers { inactive_days } => {
            deactivate_inactive_users(ctx.store.as_ref(), *inactive_days, Utc::now())
                .await
                .map(TaskOutcome::Deactivated)
        }
    }
}

pub async fn execute_with_retry(ctx: &TaskContext, task: &Task) -> Result<TaskOutcome, StoreError> {
    let mut attempt = 0;
    loop {
        match execute(ctx, task).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if attempt < ctx.retry.max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Task {:?} failed ({}), retry {}/{} in {:?}",
                    task,
                    e,
                    attempt,
                    ctx.retry.max_retries,
                    ctx.retry.delay
                );
                tokio::time::sleep(ctx.retry.delay).await;
            }
            Err(e) => {
                tracing::error!("Task {:?} failed after {} retries: {}", task, attempt, e);
                return Err(e);
            }
        }
    }
}

pub async fn run_worker(ctx: Arc<TaskContext>, mut receiver: mpsc::UnboundedReceiver<Task>) {
    tracing::info!("Task worker started");
    while let Some(task) = receiver.recv().await {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            // failures are already logged inside
            let _ = execute_with_retry(&ctx, &task).await;
        });
    }
    tracing::info!("Task worker stopped");
}

/// Midnight UTC on the first day of the month following `after`.
pub fn next_monthly_run(after: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if after.month() == 12 {
        (after.year() + 1, 1)
    } else {
        (after.year(), after.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|| after + ChronoDuration::days(30))
}

/// Enqueues the deactivation job at the start of every month.
pub async fn run_monthly_scheduler(queue: TaskQueue, inactive_days: i64) {
    loop {
        let now = Utc::now();
        let next = next_monthly_run(now);
        tracing::info!("Next inactive-user sweep at {}", next);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        queue.enqueue(Task::DeactivateInactiveUsers { inactive_days });
    }
}
