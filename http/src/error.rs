use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};
use teeworlds_exporter_metrics::EncodeError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("The metrics cannot be rendered: {0}")]
    Encode(#[from] EncodeError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("{self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
