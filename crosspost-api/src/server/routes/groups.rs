use crate::server::{Result, ServerError, ServerRouter, SharedSession, extract::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use crosspost_common::model::{
    account::AccountId,
    group::{AccountGroup, GroupId},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_groups)
        .typed_post(create_group)
        .typed_delete(delete_group)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GroupView {
    id: GroupId,
    name: String,
    account_ids: Vec<AccountId>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl From<&AccountGroup> for GroupView {
    fn from(value: &AccountGroup) -> Self {
        Self {
            id: value.id(),
            name: value.name().get().to_owned(),
            account_ids: value.account_ids().iter().cloned().collect(),
            created_at: value.created_at(),
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups", rejection(ServerError))]
struct ListGroupsPath();

async fn list_groups(
    ListGroupsPath(): ListGroupsPath,
    State(session): State<SharedSession>,
) -> Result<Json<Vec<GroupView>>> {
    let session = session.lock().await;
    let groups = session.groups().list().iter().map(GroupView::from).collect();

    Ok(Json(groups))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups/create", rejection(ServerError))]
struct CreateGroupPath();

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest {
    name: String,
    /// Defaults to the current selection.
    #[serde(default)]
    account_ids: Option<Vec<AccountId>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupResponse {
    group: GroupView,
    persistence_error: Option<String>,
}

async fn create_group(
    CreateGroupPath(): CreateGroupPath,
    State(session): State<SharedSession>,
    Json(CreateGroupRequest { name, account_ids }): Json<CreateGroupRequest>,
) -> Result<Json<CreateGroupResponse>> {
    let mut session = session.lock().await;
    let persisted = match account_ids {
        Some(account_ids) => session.create_group(&name, account_ids)?,
        None => session.save_selection_as_group(&name)?,
    };

    Ok(Json(CreateGroupResponse {
        group: GroupView::from(&persisted.value),
        persistence_error: persisted.write_error.map(|err| err.to_string()),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups/{id}", rejection(ServerError))]
struct DeleteGroupPath {
    id: GroupId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteGroupResponse {
    deleted: bool,
    persistence_error: Option<String>,
}

async fn delete_group(
    DeleteGroupPath { id }: DeleteGroupPath,
    State(session): State<SharedSession>,
) -> Result<Json<DeleteGroupResponse>> {
    let persisted = session.lock().await.delete_group(id);

    Ok(Json(DeleteGroupResponse {
        deleted: persisted.value,
        persistence_error: persisted.write_error.map(|err| err.to_string()),
    }))
}
