use crate::server::{
    Result, ServerError, ServerRouter, SharedSession,
    extract::{Json, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use crosspost_common::model::{account::Account, post::PostType};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(list_accounts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts", rejection(ServerError))]
struct ListAccountsPath();

#[derive(Deserialize)]
struct ListAccountsQuery {
    post_type: Option<PostType>,
}

/// All connected accounts, or only those that can receive `post_type`.
async fn list_accounts(
    ListAccountsPath(): ListAccountsPath,
    State(session): State<SharedSession>,
    Query(ListAccountsQuery { post_type }): Query<ListAccountsQuery>,
) -> Result<Json<Vec<Account>>> {
    let session = session.lock().await;
    let catalog = session.catalog();

    let accounts = match post_type {
        Some(post_type) => catalog
            .accounts_for(post_type)
            .into_iter()
            .cloned()
            .collect(),
        None => catalog.list_accounts().to_vec(),
    };

    Ok(Json(accounts))
}
