use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, exists, sum};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::Connection as _;

use medlink_shared::clients::db::DbPool;
use medlink_shared::errors::{AppError, AppResult, ErrorCode, ErrorKind};
use medlink_shared::types::Page;

use super::{ensure_distinct, RelationStore, UserDirectory, VisitLog};
use crate::models::{
    Block, Connection, ConnectionStatus, Follow, NewBlock, NewConnection, NewFollow, NewProfileVisit,
    ProfileVisit, UserId, UserRef, VisitStats,
};
use crate::schema::{blocks, connections, follows, profile_visitors, users};

/// Diesel-backed store. Each primitive checks one connection out of the pool on a
/// blocking thread and hands it back when the query finishes.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("storage task {op} did not complete: {e}")))?;

        if let Err(err) = &result {
            if err.kind() == ErrorKind::Storage {
                tracing::error!(op, error = %err, "storage primitive failed");
            }
        }
        result
    }
}

fn find_pair(conn: &mut PgConnection, a: UserId, b: UserId) -> QueryResult<Option<Connection>> {
    connections::table
        .filter(
            connections::requester_id.eq(a).and(connections::addressee_id.eq(b))
                .or(connections::requester_id.eq(b).and(connections::addressee_id.eq(a))),
        )
        .order(connections::id.asc())
        .first::<Connection>(conn)
        .optional()
}

/// Lock key for an unordered pair, so `(a, b)` and `(b, a)` contend on the same lock.
fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    (a.min(b), a.max(b))
}

/// Serialises writers on one pair until the surrounding transaction ends.
fn lock_pair(conn: &mut PgConnection, a: UserId, b: UserId) -> QueryResult<()> {
    let (low, high) = pair_key(a, b);
    diesel::sql_query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind::<diesel::sql_types::Integer, _>(low)
        .bind::<diesel::sql_types::Integer, _>(high)
        .execute(conn)?;
    Ok(())
}

fn offset_limit(page: Page) -> (i64, i64) {
    (page.offset, page.limit)
}

#[async_trait]
impl RelationStore for PgStore {
    async fn find_connection(&self, a: UserId, b: UserId) -> AppResult<Option<Connection>> {
        if a == b {
            return Ok(None);
        }
        self.run("find_connection", move |conn| Ok(find_pair(conn, a, b)?)).await
    }

    async fn request_connection(&self, requester: UserId, addressee: UserId) -> AppResult<Connection> {
        ensure_distinct(requester, addressee, ErrorCode::CannotConnectSelf)?;
        self.run("request_connection", move |conn| {
            let record = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                lock_pair(conn, requester, addressee)?;
                if let Some(existing) = find_pair(conn, requester, addressee)? {
                    return Ok(existing);
                }

                let inserted = diesel::insert_into(connections::table)
                    .values(&NewConnection {
                        requester_id: requester,
                        addressee_id: addressee,
                        status: ConnectionStatus::Pending,
                    })
                    .on_conflict_do_nothing()
                    .get_result::<Connection>(conn)
                    .optional()?;

                // The unordered-pair index rejected the row; someone else's record stands.
                match inserted {
                    Some(record) => Ok(record),
                    None => find_pair(conn, requester, addressee)?.ok_or(diesel::result::Error::NotFound),
                }
            })?;
            Ok(record)
        })
        .await
    }

    async fn accept_connection(&self, requester: UserId, addressee: UserId) -> AppResult<Option<Connection>> {
        ensure_distinct(requester, addressee, ErrorCode::CannotConnectSelf)?;
        self.run("accept_connection", move |conn| {
            let now = Utc::now();
            let updated = diesel::update(
                connections::table
                    .filter(connections::requester_id.eq(requester))
                    .filter(connections::addressee_id.eq(addressee))
                    .filter(connections::status.eq(ConnectionStatus::Pending)),
            )
            .set((
                connections::status.eq(ConnectionStatus::Connected),
                connections::accepted_at.eq(Some(now)),
                connections::updated_at.eq(now),
            ))
            .get_result::<Connection>(conn)
            .optional()?;
            Ok(updated)
        })
        .await
    }

    async fn remove_connection(&self, a: UserId, b: UserId) -> AppResult<Option<Connection>> {
        ensure_distinct(a, b, ErrorCode::CannotConnectSelf)?;
        self.run("remove_connection", move |conn| {
            let removed = diesel::delete(
                connections::table.filter(
                    connections::requester_id.eq(a).and(connections::addressee_id.eq(b))
                        .or(connections::requester_id.eq(b).and(connections::addressee_id.eq(a))),
                ),
            )
            .get_results::<Connection>(conn)?;
            Ok(removed.into_iter().next())
        })
        .await
    }

    async fn list_connections(
        &self,
        user: UserId,
        status: Option<ConnectionStatus>,
        page: Page,
    ) -> AppResult<Vec<Connection>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_connections", move |conn| {
            let mut query = connections::table
                .filter(connections::requester_id.eq(user).or(connections::addressee_id.eq(user)))
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(connections::status.eq(status));
            }
            let rows = query
                .order((
                    connections::accepted_at.desc().nulls_last(),
                    connections::created_at.desc(),
                    connections::id.desc(),
                ))
                .offset(offset)
                .limit(limit)
                .load::<Connection>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn list_pending_incoming(&self, user: UserId, page: Page) -> AppResult<Vec<Connection>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_pending_incoming", move |conn| {
            let rows = connections::table
                .filter(connections::addressee_id.eq(user))
                .filter(connections::status.eq(ConnectionStatus::Pending))
                .order((connections::requested_at.desc(), connections::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<Connection>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn list_pending_outgoing(&self, user: UserId, page: Page) -> AppResult<Vec<Connection>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_pending_outgoing", move |conn| {
            let rows = connections::table
                .filter(connections::requester_id.eq(user))
                .filter(connections::status.eq(ConnectionStatus::Pending))
                .order((connections::requested_at.desc(), connections::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<Connection>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn count_connections(&self, user: UserId) -> AppResult<i64> {
        self.run("count_connections", move |conn| {
            let count = connections::table
                .filter(connections::requester_id.eq(user).or(connections::addressee_id.eq(user)))
                .filter(connections::status.eq(ConnectionStatus::Connected))
                .select(count_star())
                .get_result::<i64>(conn)?;
            Ok(count)
        })
        .await
    }

    async fn count_pending_incoming(&self, user: UserId) -> AppResult<i64> {
        self.run("count_pending_incoming", move |conn| {
            let count = connections::table
                .filter(connections::addressee_id.eq(user))
                .filter(connections::status.eq(ConnectionStatus::Pending))
                .select(count_star())
                .get_result::<i64>(conn)?;
            Ok(count)
        })
        .await
    }

    async fn count_pending_outgoing(&self, user: UserId) -> AppResult<i64> {
        self.run("count_pending_outgoing", move |conn| {
            let count = connections::table
                .filter(connections::requester_id.eq(user))
                .filter(connections::status.eq(ConnectionStatus::Pending))
                .select(count_star())
                .get_result::<i64>(conn)?;
            Ok(count)
        })
        .await
    }

    async fn connected_ids(&self, user: UserId) -> AppResult<Vec<UserId>> {
        self.run("connected_ids", move |conn| {
            let pairs = connections::table
                .filter(connections::requester_id.eq(user).or(connections::addressee_id.eq(user)))
                .filter(connections::status.eq(ConnectionStatus::Connected))
                .order((
                    connections::accepted_at.desc().nulls_last(),
                    connections::created_at.desc(),
                    connections::id.desc(),
                ))
                .select((connections::requester_id, connections::addressee_id))
                .load::<(UserId, UserId)>(conn)?;
            Ok(pairs
                .into_iter()
                .map(|(requester, addressee)| if requester == user { addressee } else { requester })
                .collect())
        })
        .await
    }

    async fn connected_edges(&self, users: &[UserId]) -> AppResult<Vec<(UserId, UserId)>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let users = users.to_vec();
        self.run("connected_edges", move |conn| {
            let pairs = connections::table
                .filter(
                    connections::requester_id.eq_any(&users)
                        .or(connections::addressee_id.eq_any(&users)),
                )
                .filter(connections::status.eq(ConnectionStatus::Connected))
                .select((connections::requester_id, connections::addressee_id))
                .load::<(UserId, UserId)>(conn)?;

            let wanted: HashSet<UserId> = users.into_iter().collect();
            let mut edges = Vec::with_capacity(pairs.len());
            for (requester, addressee) in pairs {
                if wanted.contains(&requester) {
                    edges.push((requester, addressee));
                }
                if wanted.contains(&addressee) {
                    edges.push((addressee, requester));
                }
            }
            Ok(edges)
        })
        .await
    }

    async fn follow(&self, follower: UserId, following: UserId) -> AppResult<Follow> {
        ensure_distinct(follower, following, ErrorCode::CannotFollowSelf)?;
        self.run("follow", move |conn| {
            let inserted = diesel::insert_into(follows::table)
                .values(&NewFollow { follower_id: follower, following_id: following })
                .on_conflict_do_nothing()
                .get_result::<Follow>(conn)
                .optional()?;
            match inserted {
                Some(record) => Ok(record),
                None => Ok(follows::table
                    .filter(follows::follower_id.eq(follower))
                    .filter(follows::following_id.eq(following))
                    .first::<Follow>(conn)?),
            }
        })
        .await
    }

    async fn unfollow(&self, follower: UserId, following: UserId) -> AppResult<Option<Follow>> {
        ensure_distinct(follower, following, ErrorCode::CannotFollowSelf)?;
        self.run("unfollow", move |conn| {
            let removed = diesel::delete(
                follows::table
                    .filter(follows::follower_id.eq(follower))
                    .filter(follows::following_id.eq(following)),
            )
            .get_result::<Follow>(conn)
            .optional()?;
            Ok(removed)
        })
        .await
    }

    async fn is_following(&self, follower: UserId, following: UserId) -> AppResult<bool> {
        self.run("is_following", move |conn| {
            let found = diesel::select(exists(
                follows::table
                    .filter(follows::follower_id.eq(follower))
                    .filter(follows::following_id.eq(following)),
            ))
            .get_result::<bool>(conn)?;
            Ok(found)
        })
        .await
    }

    async fn list_followers(&self, user: UserId, page: Page) -> AppResult<Vec<Follow>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_followers", move |conn| {
            let rows = follows::table
                .filter(follows::following_id.eq(user))
                .order((follows::created_at.desc(), follows::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<Follow>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn list_following(&self, user: UserId, page: Page) -> AppResult<Vec<Follow>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_following", move |conn| {
            let rows = follows::table
                .filter(follows::follower_id.eq(user))
                .order((follows::created_at.desc(), follows::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<Follow>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn count_followers(&self, user: UserId) -> AppResult<i64> {
        self.run("count_followers", move |conn| {
            let count = follows::table
                .filter(follows::following_id.eq(user))
                .select(count_star())
                .get_result::<i64>(conn)?;
            Ok(count)
        })
        .await
    }

    async fn count_following(&self, user: UserId) -> AppResult<i64> {
        self.run("count_following", move |conn| {
            let count = follows::table
                .filter(follows::follower_id.eq(user))
                .select(count_star())
                .get_result::<i64>(conn)?;
            Ok(count)
        })
        .await
    }

    async fn block(&self, blocker: UserId, blocked: UserId) -> AppResult<Block> {
        ensure_distinct(blocker, blocked, ErrorCode::CannotBlockSelf)?;
        self.run("block", move |conn| {
            let inserted = diesel::insert_into(blocks::table)
                .values(&NewBlock { blocker_id: blocker, blocked_id: blocked })
                .on_conflict_do_nothing()
                .get_result::<Block>(conn)
                .optional()?;
            match inserted {
                Some(record) => Ok(record),
                None => Ok(blocks::table
                    .filter(blocks::blocker_id.eq(blocker))
                    .filter(blocks::blocked_id.eq(blocked))
                    .first::<Block>(conn)?),
            }
        })
        .await
    }

    async fn unblock(&self, blocker: UserId, blocked: UserId) -> AppResult<Option<Block>> {
        ensure_distinct(blocker, blocked, ErrorCode::CannotBlockSelf)?;
        self.run("unblock", move |conn| {
            let removed = diesel::delete(
                blocks::table
                    .filter(blocks::blocker_id.eq(blocker))
                    .filter(blocks::blocked_id.eq(blocked)),
            )
            .get_result::<Block>(conn)
            .optional()?;
            Ok(removed)
        })
        .await
    }

    async fn is_blocked_one_way(&self, a: UserId, b: UserId) -> AppResult<bool> {
        self.run("is_blocked_one_way", move |conn| {
            let found = diesel::select(exists(
                blocks::table
                    .filter(blocks::blocker_id.eq(a))
                    .filter(blocks::blocked_id.eq(b)),
            ))
            .get_result::<bool>(conn)?;
            Ok(found)
        })
        .await
    }

    async fn is_blocked_either_way(&self, a: UserId, b: UserId) -> AppResult<bool> {
        self.run("is_blocked_either_way", move |conn| {
            let found = diesel::select(exists(
                blocks::table.filter(
                    blocks::blocker_id.eq(a).and(blocks::blocked_id.eq(b))
                        .or(blocks::blocker_id.eq(b).and(blocks::blocked_id.eq(a))),
                ),
            ))
            .get_result::<bool>(conn)?;
            Ok(found)
        })
        .await
    }

    async fn list_blocked(&self, blocker: UserId, page: Page) -> AppResult<Vec<Block>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_blocked", move |conn| {
            let rows = blocks::table
                .filter(blocks::blocker_id.eq(blocker))
                .order((blocks::created_at.desc(), blocks::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<Block>(conn)?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, id: UserId) -> AppResult<Option<UserRef>> {
        self.run("find_user", move |conn| {
            let user = users::table
                .find(id)
                .select(UserRef::as_select())
                .first(conn)
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn users_by_ids(&self, ids: &[UserId]) -> AppResult<Vec<UserRef>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.run("users_by_ids", move |conn| {
            let rows = users::table
                .filter(users::id.eq_any(&ids))
                .select(UserRef::as_select())
                .load(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn ping(&self) -> AppResult<()> {
        self.run("ping", |conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl VisitLog for PgStore {
    async fn record_visit(&self, visitor: UserId, profile: UserId) -> AppResult<ProfileVisit> {
        ensure_distinct(visitor, profile, ErrorCode::BadRequest)?;
        self.run("record_visit", move |conn| {
            let now = Utc::now();
            let visit = diesel::insert_into(profile_visitors::table)
                .values(&NewProfileVisit {
                    visitor_id: visitor,
                    profile_user_id: profile,
                    visit_count: 1,
                })
                .on_conflict((profile_visitors::visitor_id, profile_visitors::profile_user_id))
                .do_update()
                .set((
                    profile_visitors::visit_count.eq(profile_visitors::visit_count + 1),
                    profile_visitors::last_visited_at.eq(now),
                    profile_visitors::updated_at.eq(now),
                ))
                .get_result::<ProfileVisit>(conn)?;
            Ok(visit)
        })
        .await
    }

    async fn list_visitors(&self, profile: UserId, page: Page) -> AppResult<Vec<ProfileVisit>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_visitors", move |conn| {
            let rows = profile_visitors::table
                .filter(profile_visitors::profile_user_id.eq(profile))
                .order((profile_visitors::last_visited_at.desc(), profile_visitors::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<ProfileVisit>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn list_visited(&self, visitor: UserId, page: Page) -> AppResult<Vec<ProfileVisit>> {
        let (offset, limit) = offset_limit(page);
        self.run("list_visited", move |conn| {
            let rows = profile_visitors::table
                .filter(profile_visitors::visitor_id.eq(visitor))
                .order((profile_visitors::last_visited_at.desc(), profile_visitors::id.desc()))
                .offset(offset)
                .limit(limit)
                .load::<ProfileVisit>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn visit_stats(&self, profile: UserId, recent_since: DateTime<Utc>) -> AppResult<VisitStats> {
        self.run("visit_stats", move |conn| {
            let (unique_visitors, total_visits) = profile_visitors::table
                .filter(profile_visitors::profile_user_id.eq(profile))
                .select((count_star(), sum(profile_visitors::visit_count)))
                .get_result::<(i64, Option<i64>)>(conn)?;
            let visitors_last_7_days = profile_visitors::table
                .filter(profile_visitors::profile_user_id.eq(profile))
                .filter(profile_visitors::last_visited_at.ge(recent_since))
                .select(count_star())
                .get_result::<i64>(conn)?;
            Ok(VisitStats {
                unique_visitors,
                total_visits: total_visits.unwrap_or(0),
                visitors_last_7_days,
            })
        })
        .await
    }
}
