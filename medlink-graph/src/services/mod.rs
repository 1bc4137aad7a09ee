pub mod access_guard;
pub mod graph_query;
pub mod relations;
pub mod suggester;
pub mod visibility;
pub mod visits;

use std::collections::HashMap;

use medlink_shared::errors::AppResult;

use crate::models::{UserId, UserRef};
use crate::store::{GraphStore, UserDirectory};

pub use access_guard::AccessGuard;
pub use graph_query::GraphQuery;
pub use relations::RelationService;
pub use suggester::{SuggestSettings, Suggester};
pub use visibility::{Relationship, Visible, VisibilityFilter};
pub use visits::VisitService;

/// Display fields for `ids`, keyed by id. Users deleted in the meantime are absent.
pub(crate) async fn resolve_users(store: &dyn GraphStore, ids: &[UserId]) -> AppResult<HashMap<UserId, UserRef>> {
    let users = store.users_by_ids(ids).await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}
