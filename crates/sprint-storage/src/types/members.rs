//! Member types.

use chrono::{DateTime, Utc};

use super::MemberId;

/// Member profile, as exposed by the member directory.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub id: MemberId,
    pub nickname: String,
    pub email: String,
    pub height: f32,
    pub weight: f32,
    pub tier: i32,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a member
#[derive(Clone, Debug)]
pub struct CreateMemberParams {
    pub nickname: String,
    pub email: String,
    pub height: f32,
    pub weight: f32,
    pub tier: i32,
    pub picture: Option<String>,
}
