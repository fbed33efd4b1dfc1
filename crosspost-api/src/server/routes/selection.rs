use crate::server::{
    Result, ServerError, ServerRouter, SharedSession, extract::Json, routes::groups::GroupView,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use crosspost_common::model::{account::AccountId, group::GroupId, post::PostType};
use crosspost_composer::{selection::ViewMode, session::ComposerSession};
use serde::{Deserialize, Serialize};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_selection)
        .typed_put(set_post_type)
        .typed_put(set_view)
        .typed_post(toggle_account)
        .typed_post(select_group)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectionView {
    post_type: Option<PostType>,
    view: ViewMode,
    /// Sorted by id.
    selected: Vec<AccountId>,
    /// The saved group equal to the selection, offered instead of saving a
    /// new one.
    matching_group: Option<GroupView>,
}

impl From<&ComposerSession> for SelectionView {
    fn from(value: &ComposerSession) -> Self {
        let selection = value.selection();
        Self {
            post_type: selection.post_type(),
            view: selection.view(),
            selected: selection.selected().iter().cloned().collect(),
            matching_group: value.matching_group().map(GroupView::from),
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/selection", rejection(ServerError))]
struct GetSelectionPath();

async fn get_selection(
    GetSelectionPath(): GetSelectionPath,
    State(session): State<SharedSession>,
) -> Result<Json<SelectionView>> {
    let session = session.lock().await;

    Ok(Json(SelectionView::from(&*session)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/selection/post-type/{post_type}", rejection(ServerError))]
struct SetPostTypePath {
    post_type: PostType,
}

async fn set_post_type(
    SetPostTypePath { post_type }: SetPostTypePath,
    State(session): State<SharedSession>,
) -> Result<Json<SelectionView>> {
    let mut session = session.lock().await;
    session.set_post_type(post_type);

    Ok(Json(SelectionView::from(&*session)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/selection/view/{mode}", rejection(ServerError))]
struct SetViewPath {
    mode: ViewMode,
}

async fn set_view(
    SetViewPath { mode }: SetViewPath,
    State(session): State<SharedSession>,
) -> Result<Json<SelectionView>> {
    let mut session = session.lock().await;
    session.set_view(mode);

    Ok(Json(SelectionView::from(&*session)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/selection/toggle/{account_id}", rejection(ServerError))]
struct ToggleAccountPath {
    account_id: AccountId,
}

async fn toggle_account(
    ToggleAccountPath { account_id }: ToggleAccountPath,
    State(session): State<SharedSession>,
) -> Result<Json<SelectionView>> {
    let mut session = session.lock().await;
    session.toggle_account(&account_id)?;

    Ok(Json(SelectionView::from(&*session)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/selection/group/{id}", rejection(ServerError))]
struct SelectGroupPath {
    id: GroupId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectGroupResponse {
    selection: SelectionView,
    /// Members left out because they cannot receive the current post type.
    dropped: Vec<AccountId>,
}

async fn select_group(
    SelectGroupPath { id }: SelectGroupPath,
    State(session): State<SharedSession>,
) -> Result<Json<SelectGroupResponse>> {
    let mut session = session.lock().await;
    let outcome = session.select_group_by_id(id)?;

    Ok(Json(SelectGroupResponse {
        selection: SelectionView::from(&*session),
        dropped: outcome.dropped,
    }))
}
