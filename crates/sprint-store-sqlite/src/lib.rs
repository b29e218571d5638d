use std::str::FromStr;

use chrono::{DateTime, Utc};
use sprint_storage::{
    CreateGroupParams, CreateMemberParams, Group, GroupId, Member, MemberDirectory, MemberId,
    MembershipChange, MembershipRecord, MembershipState, Store, StoreError, UpdateGroupParams,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SELECT_GROUP: &str = "SELECT id, name, leader_id, description, picture, personnel, \
     max_personnel, created_at, updated_at FROM groups";
const SELECT_MEMBERSHIP: &str =
    "SELECT group_id, member_id, state, created_at, updated_at FROM group_memberships";
const SELECT_MEMBER: &str =
    "SELECT id, nickname, email, height, weight, tier, picture, created_at FROM members";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `~/.sprint/groups.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".sprint");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("groups.db");
        let url = format!("sqlite://{}", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(backend)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Register a member so this store can serve as the member directory.
    pub async fn create_member(&self, params: &CreateMemberParams) -> Result<Member, StoreError> {
        let result = sqlx::query(
            "INSERT INTO members(nickname, email, height, weight, tier, picture, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&params.nickname)
        .bind(&params.email)
        .bind(f64::from(params.height))
        .bind(f64::from(params.weight))
        .bind(i64::from(params.tier))
        .bind(&params.picture)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;

        self.get_member(&MemberId(result.last_insert_rowid())).await
    }
}

// ──────────────────────────────── Rows & errors ────────────────────────────────

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    leader_id: i64,
    description: Option<String>,
    picture: Option<String>,
    personnel: i64,
    max_personnel: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: GroupId(row.id),
            name: row.name,
            leader_id: MemberId(row.leader_id),
            description: row.description,
            picture: row.picture,
            personnel: row.personnel as u32,
            max_personnel: row.max_personnel as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    group_id: i64,
    member_id: i64,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for MembershipRecord {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let state = MembershipState::from_str(&row.state)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(MembershipRecord {
            group_id: GroupId(row.group_id),
            member_id: MemberId(row.member_id),
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    nickname: String,
    email: String,
    height: f64,
    weight: f64,
    tier: i64,
    picture: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: MemberId(row.id),
            nickname: row.nickname,
            email: row.email,
            height: row.height as f32,
            weight: row.weight as f32,
            tier: row.tier as i32,
            picture: row.picture,
            created_at: row.created_at,
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::AlreadyExists,
        Some(db) if db.is_foreign_key_violation() => StoreError::NotFound,
        Some(db) if db.is_check_violation() => StoreError::CapacityExceeded,
        _ => backend(e),
    }
}

/// Within a guarded change a duplicate key or a second leader means another
/// writer got there first.
fn map_transition_err(e: sqlx::Error) -> StoreError {
    match map_write_err(e) {
        StoreError::AlreadyExists => StoreError::Conflict,
        other => other,
    }
}

async fn fetch_group(conn: &mut SqliteConnection, group_id: i64) -> Result<Group, StoreError> {
    let sql = format!("{SELECT_GROUP} WHERE id = ?");
    sqlx::query_as::<_, GroupRow>(&sql)
        .bind(group_id)
        .fetch_optional(conn)
        .await
        .map_err(backend)?
        .map(Group::from)
        .ok_or(StoreError::NotFound)
}

fn push_state_filter(qb: &mut QueryBuilder<'_, Sqlite>, states: &[MembershipState]) {
    if states.is_empty() {
        return;
    }
    qb.push(" AND state IN (");
    let mut list = qb.separated(", ");
    for state in states {
        list.push_bind(state.as_str());
    }
    list.push_unseparated(")");
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Groups ─────────────────────────────

    async fn create_group(&self, params: &CreateGroupParams) -> Result<Group, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            "INSERT INTO groups(name, leader_id, description, picture, personnel, max_personnel,
                                created_at, updated_at)
             VALUES(?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(&params.name)
        .bind(params.leader_id.0)
        .bind(&params.description)
        .bind(&params.picture)
        .bind(i64::from(params.max_personnel))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_write_err)?;

        let group_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO group_memberships(group_id, member_id, state, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?)",
        )
        .bind(group_id)
        .bind(params.leader_id.0)
        .bind(MembershipState::Leader.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_write_err)?;

        let group = fetch_group(&mut tx, group_id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(group)
    }

    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError> {
        let sql = format!("{SELECT_GROUP} WHERE id = ?");
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(group_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Group::from)
            .ok_or(StoreError::NotFound)
    }

    async fn get_group_by_name(&self, name: &str) -> Result<Group, StoreError> {
        let sql = format!("{SELECT_GROUP} WHERE name = ?");
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Group::from)
            .ok_or(StoreError::NotFound)
    }

    async fn find_groups_by_name_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<Group>, StoreError> {
        // SQLite's lower() folds ASCII only, so matching happens here.
        let needle = fragment.to_lowercase();
        let sql = format!("{SELECT_GROUP} ORDER BY name");
        let rows = sqlx::query_as::<_, GroupRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(Group::from)
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .collect())
    }

    async fn update_group(
        &self,
        group_id: &GroupId,
        params: &UpdateGroupParams,
    ) -> Result<Group, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE groups SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(name) = &params.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(description) = &params.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(picture) = &params.picture {
            qb.push(", picture = ").push_bind(picture.clone());
        }
        if let Some(max_personnel) = params.max_personnel {
            qb.push(", max_personnel = ")
                .push_bind(i64::from(max_personnel));
        }
        qb.push(" WHERE id = ").push_bind(group_id.0);

        let result = qb
            .build()
            .execute(&mut *tx)
            .await
            .map_err(map_write_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let group = fetch_group(&mut tx, group_id.0).await?;
        tx.commit().await.map_err(backend)?;
        Ok(group)
    }

    async fn delete_group(
        &self,
        group_id: &GroupId,
        leader_id: &MemberId,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query("DELETE FROM groups WHERE id = ? AND leader_id = ?")
            .bind(group_id.0)
            .bind(leader_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        // ON DELETE CASCADE covers this when foreign keys are enforced.
        sqlx::query("DELETE FROM group_memberships WHERE group_id = ?")
            .bind(group_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    // ──────────────────────────── Memberships ─────────────────────────

    async fn get_membership(
        &self,
        group_id: &GroupId,
        member_id: &MemberId,
    ) -> Result<MembershipRecord, StoreError> {
        let sql = format!("{SELECT_MEMBERSHIP} WHERE group_id = ? AND member_id = ?");
        let row = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(group_id.0)
            .bind(member_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        MembershipRecord::try_from(row)
    }

    async fn list_group_memberships(
        &self,
        group_id: &GroupId,
        states: &[MembershipState],
    ) -> Result<Vec<MembershipRecord>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_MEMBERSHIP);
        qb.push(" WHERE group_id = ").push_bind(group_id.0);
        push_state_filter(&mut qb, states);
        qb.push(" ORDER BY updated_at, member_id");

        let rows = qb
            .build_query_as::<MembershipRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(MembershipRecord::try_from).collect()
    }

    async fn list_member_memberships(
        &self,
        member_id: &MemberId,
        states: &[MembershipState],
    ) -> Result<Vec<MembershipRecord>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_MEMBERSHIP);
        qb.push(" WHERE member_id = ").push_bind(member_id.0);
        push_state_filter(&mut qb, states);
        qb.push(" ORDER BY updated_at, group_id");

        let rows = qb
            .build_query_as::<MembershipRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(MembershipRecord::try_from).collect()
    }

    async fn apply_membership_change(
        &self,
        change: &MembershipChange,
    ) -> Result<Group, StoreError> {
        let group_id = change.group_id.0;
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for t in &change.transitions {
            let affected = match t.expected {
                None => sqlx::query(
                    "INSERT INTO group_memberships(group_id, member_id, state, created_at, updated_at)
                     VALUES(?, ?, ?, ?, ?)",
                )
                .bind(group_id)
                .bind(t.member_id.0)
                .bind(t.next.as_str())
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(map_transition_err)?
                .rows_affected(),
                Some(expected) => sqlx::query(
                    "UPDATE group_memberships SET state = ?, updated_at = ?
                     WHERE group_id = ? AND member_id = ? AND state = ?",
                )
                .bind(t.next.as_str())
                .bind(now)
                .bind(group_id)
                .bind(t.member_id.0)
                .bind(expected.as_str())
                .execute(&mut *tx)
                .await
                .map_err(map_transition_err)?
                .rows_affected(),
            };
            if affected == 0 {
                // Dropping `tx` rolls back the transitions already applied.
                return Err(StoreError::Conflict);
            }
        }

        if change.personnel_delta != 0 {
            let delta = i64::from(change.personnel_delta);
            let result = sqlx::query(
                "UPDATE groups SET personnel = personnel + ?, updated_at = ?
                 WHERE id = ? AND personnel + ? >= 1 AND personnel + ? <= max_personnel",
            )
            .bind(delta)
            .bind(now)
            .bind(group_id)
            .bind(delta)
            .bind(delta)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                let exists = sqlx::query_as::<_, (i64,)>("SELECT id FROM groups WHERE id = ?")
                    .bind(group_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(backend)?;
                return Err(match exists {
                    Some(_) => StoreError::CapacityExceeded,
                    None => StoreError::NotFound,
                });
            }
        }

        if let Some(leader) = &change.leader_change {
            let result = sqlx::query(
                "UPDATE groups SET leader_id = ?, updated_at = ? WHERE id = ? AND leader_id = ?",
            )
            .bind(leader.to.0)
            .bind(now)
            .bind(group_id)
            .bind(leader.from.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict);
            }
        }

        let group = fetch_group(&mut tx, group_id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(group)
    }
}

#[async_trait::async_trait]
impl MemberDirectory for SqliteStore {
    async fn get_member(&self, member_id: &MemberId) -> Result<Member, StoreError> {
        let sql = format!("{SELECT_MEMBER} WHERE id = ?");
        sqlx::query_as::<_, MemberRow>(&sql)
            .bind(member_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Member::from)
            .ok_or(StoreError::NotFound)
    }
}
