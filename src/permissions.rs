// src/permissions.rs
//! Per-action access rules for owned resources.
//!
//! Authentication itself is enforced by the [`crate::auth::AuthUser`]
//! extractor; the rules here decide what an authenticated caller may do
//! with a particular course or lesson. Reads and creates are open to any
//! authenticated caller, so only writes to an existing object are checked.
use crate::error::ApiError;
use crate::models::{Course, Lesson, MODERATORS_GROUP, User};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Update,
    PartialUpdate,
    Destroy,
}

pub trait Owned {
    fn owner_id(&self) -> Option<Uuid>;
}

impl Owned for Course {
    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }
}

impl Owned for Lesson {
    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }
}

pub fn is_moderator(user: &User) -> bool {
    user.in_group(MODERATORS_GROUP)
}

pub fn is_owner(user: &User, obj: &impl Owned) -> bool {
    obj.owner_id() == Some(user.id)
}

/// Staff and moderators see every lesson; everyone else only their own.
pub fn sees_all_lessons(user: &User) -> bool {
    user.is_staff || is_moderator(user)
}

pub fn has_object_permission(user: &User, action: Action, obj: &impl Owned) -> bool {
    match action {
        Action::Update | Action::PartialUpdate => is_owner(user, obj) || is_moderator(user),
        Action::Destroy => user.is_staff || is_owner(user, obj),
    }
}

pub fn check_object_permission(
    user: &User,
    action: Action,
    obj: &impl Owned,
) -> Result<(), ApiError> {
    if has_object_permission(user, action, obj) {
        Ok(())
    } else {
        tracing::info!("User {} denied {:?}", user.id, action);
        Err(ApiError::forbidden())
    }
}
