use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tower_http::services::ServeDir;
use tracing::warn;

use climate_common::{chart_url, BaseCommand, ChartError, Metric, PressEvent};

use crate::host::{CommandRejection, KioskEvent};

#[derive(Clone)]
pub struct HttpState {
    events: mpsc::UnboundedSender<KioskEvent>,
    chart_base_url: Arc<String>,
}

impl HttpState {
    pub fn new(events: mpsc::UnboundedSender<KioskEvent>, chart_base_url: String) -> Self {
        Self {
            events,
            chart_base_url: Arc::new(chart_base_url),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ControlAccepted {
    control: BaseCommand,
    action: &'static str,
}

#[derive(Debug, Serialize)]
struct CommandSent {
    command: String,
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    metric: String,
    #[serde(default = "default_chart_days")]
    days: u16,
}

#[derive(Debug, Serialize)]
struct ChartLink {
    metric: Metric,
    days: u16,
    url: String,
}

fn default_chart_days() -> u16 {
    7
}

pub fn router(state: HttpState, web_root: &str) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/controls/{control}/{action}", post(handle_control))
        .route("/api/commands/{command}", post(handle_send_command))
        .route("/api/chart", get(handle_get_chart))
        .fallback_service(ServeDir::new(web_root))
        .with_state(state)
}

async fn handle_get_status(State(state): State<HttpState>) -> impl IntoResponse {
    let (reply, response) = oneshot::channel();
    if state.events.send(KioskEvent::Status(reply)).is_err() {
        return loop_unavailable();
    }
    match response.await {
        Ok(status) => Json(status).into_response(),
        Err(_) => loop_unavailable(),
    }
}

async fn handle_control(
    State(state): State<HttpState>,
    Path((control, action)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(control) = BaseCommand::parse(&control) else {
        return error_response(StatusCode::NOT_FOUND, "control must be open or close");
    };
    let (event, action) = match action.as_str() {
        "press" => (PressEvent::Start(control), "press"),
        "release" => (PressEvent::Release, "release"),
        "cancel" => (PressEvent::Cancel, "cancel"),
        _ => {
            return error_response(
                StatusCode::NOT_FOUND,
                "action must be press, release or cancel",
            )
        }
    };

    if state
        .events
        .send(KioskEvent::Press { control, event })
        .is_err()
    {
        return loop_unavailable();
    }
    (StatusCode::ACCEPTED, Json(ControlAccepted { control, action })).into_response()
}

async fn handle_send_command(
    State(state): State<HttpState>,
    Path(command): Path<String>,
) -> impl IntoResponse {
    let (reply, response) = oneshot::channel();
    if state
        .events
        .send(KioskEvent::SendCommand {
            command: command.clone(),
            reply,
        })
        .is_err()
    {
        return loop_unavailable();
    }

    match response.await {
        Ok(Ok(())) => Json(CommandSent { command }).into_response(),
        Ok(Err(rejection)) => {
            let status = match rejection {
                CommandRejection::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CommandRejection::NotConnected(_) | CommandRejection::TransportGone(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            };
            error_response(status, &rejection.to_string())
        }
        Err(_) => loop_unavailable(),
    }
}

async fn handle_get_chart(
    State(state): State<HttpState>,
    Query(query): Query<ChartQuery>,
) -> impl IntoResponse {
    let Some(metric) = Metric::parse(&query.metric) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "metric must be temperature, humidity or gas",
        );
    };
    match chart_url(&state.chart_base_url, metric, query.days) {
        Ok(url) => Json(ChartLink {
            metric,
            days: query.days,
            url,
        })
        .into_response(),
        Err(err @ ChartError::DaysOutOfRange(_)) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

fn loop_unavailable() -> axum::response::Response {
    warn!("kiosk event loop is not accepting events");
    error_response(StatusCode::SERVICE_UNAVAILABLE, "kiosk is shutting down")
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body, body::Body, http::Request};
    use climate_common::{GatewayError, SendError};
    use tower::ServiceExt;

    type Answer = fn(&str) -> Result<(), CommandRejection>;

    // Stands in for the event loop: answers command requests with `answer`.
    fn app(answer: Answer) -> Router {
        let (events, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let KioskEvent::SendCommand { command, reply } = event {
                    let _ = reply.send(answer(&command));
                }
            }
        });
        router(
            HttpState::new(events, "http://10.0.0.2:8000".to_string()),
            "web",
        )
    }

    fn accept(_: &str) -> Result<(), CommandRejection> {
        Ok(())
    }

    async fn status_of(app: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        app.oneshot(request).await.expect("response").status()
    }

    #[tokio::test]
    async fn gateway_rejection_is_unprocessable() {
        let app = app(|command| {
            Err(CommandRejection::Invalid(GatewayError::NotAllowed(
                command.to_string(),
            )))
        });
        assert_eq!(
            status_of(app, "POST", "/api/commands/unlock_door").await,
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn missing_connection_is_unavailable() {
        let not_connected = app(|_| {
            Err(CommandRejection::NotConnected(SendError::NotConnected(
                "disconnected",
            )))
        });
        assert_eq!(
            status_of(not_connected, "POST", "/api/commands/open").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        let transport_gone = app(|_| Err(CommandRejection::TransportGone(4)));
        assert_eq!(
            status_of(transport_gone, "POST", "/api/commands/open").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn accepted_command_is_echoed() {
        let request = Request::post("/api/commands/manual_open")
            .body(Body::empty())
            .expect("request");
        let response = app(accept).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["command"], "manual_open");
    }

    #[tokio::test]
    async fn stopped_event_loop_is_unavailable() {
        let (events, rx) = mpsc::unbounded_channel();
        drop(rx);
        let app = router(HttpState::new(events, "http://x".to_string()), "web");
        assert_eq!(
            status_of(app, "POST", "/api/commands/open").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn unknown_control_or_action_is_not_found() {
        let app = app(accept);
        assert_eq!(
            status_of(app.clone(), "POST", "/api/controls/door/press").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(app.clone(), "POST", "/api/controls/open/hold").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(app, "POST", "/api/controls/open/press").await,
            StatusCode::ACCEPTED
        );
    }

    #[tokio::test]
    async fn chart_rejects_bad_metric_and_day_range() {
        let app = app(accept);
        assert_eq!(
            status_of(app.clone(), "GET", "/api/chart?metric=pressure").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(app.clone(), "GET", "/api/chart?metric=gas&days=15").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(app.clone(), "GET", "/api/chart?metric=gas&days=0").await,
            StatusCode::BAD_REQUEST
        );

        let request = Request::get("/api/chart?metric=gas&days=14")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["url"], "http://10.0.0.2:8000/api/graf/gas?dage=14");
    }
}
