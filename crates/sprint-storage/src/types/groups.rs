//! Group types.

use chrono::{DateTime, Utc};

use super::{GroupId, MemberId};

/// Group record
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub leader_id: MemberId,
    pub description: Option<String>,
    pub picture: Option<String>,
    pub personnel: u32,
    pub max_personnel: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn is_full(&self) -> bool {
        self.personnel >= self.max_personnel
    }
}

/// Parameters for creating a group.
///
/// The backend creates the leader's membership record in the same transaction.
#[derive(Clone, Debug)]
pub struct CreateGroupParams {
    pub name: String,
    pub leader_id: MemberId,
    pub description: Option<String>,
    pub picture: Option<String>,
    pub max_personnel: u32,
}

/// Parameters for updating group metadata (`None` leaves a field unchanged).
#[derive(Clone, Debug, Default)]
pub struct UpdateGroupParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub picture: Option<String>,
    pub max_personnel: Option<u32>,
}

impl UpdateGroupParams {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.picture.is_none()
            && self.max_personnel.is_none()
    }
}
