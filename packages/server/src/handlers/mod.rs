use std::collections::{HashMap, HashSet};

use sea_orm::*;

use crate::entity::user;
use crate::error::AppError;

pub mod admin;
pub mod auth;
pub mod merchant;
pub mod photo;

/// Resolve a set of user ids to usernames for listing decoration.
/// Ids without a matching account are simply absent from the map.
pub(crate) async fn usernames_for<C, I>(db: &C, ids: I) -> Result<HashMap<i32, String>, AppError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i32>,
{
    let ids: HashSet<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i32, String)> = user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .column(user::Column::Username)
        .filter(user::Column::Id.is_in(ids))
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows.into_iter().collect())
}
