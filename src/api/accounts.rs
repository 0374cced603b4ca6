use axum::extract::{Path, State};

use crate::model::AccountId;
use crate::store::Store;
use crate::util::http_error::{AnyhowHttpError, HttpResult};

use super::ApiState;

pub async fn update_folder_list<S: Store>(Path(account_id): Path<AccountId>, State(state): State<ApiState<S>>) -> HttpResult<()> {
    state.orchestrator.update_folder_list(account_id).await.into_internal_error_result()
}

pub async fn host_changed<S: Store>(Path(account_id): Path<AccountId>, State(state): State<ApiState<S>>) -> HttpResult<()> {
    state.orchestrator.host_changed(account_id).await.into_internal_error_result()
}
