use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use apiguard_domain::StatsReport;

use super::service::{AdminAction, AdminError, AdminResponse, AdminService};

pub async fn get_stats(State(service): State<AdminService>) -> Json<StatsReport> {
    Json(service.stats())
}

pub async fn post_admin(
    State(service): State<AdminService>,
    payload: Result<Json<AdminAction>, JsonRejection>,
) -> Response {
    let Json(action) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let body = AdminResponse::failure(rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match service.execute(action) {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminError::EmptyPatch | AdminError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(AdminResponse::failure(self.to_string()))).into_response()
    }
}
