use super::AppState;
use crate::stream::multipart;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

/// Endless multipart MJPEG response. Ends when the client goes away or the
/// service shuts down.
pub async fn live_video_feed(State(state): State<AppState>) -> Response {
    let consumer = state.stream.subscribe();
    let body = Body::from_stream(consumer.into_stream());
    (
        [
            (header::CONTENT_TYPE, multipart::content_type()),
            (header::CACHE_CONTROL, "no-cache, no-store".to_string()),
        ],
        body,
    )
        .into_response()
}
