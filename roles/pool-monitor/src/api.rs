use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Incoming, server::conn::http1, service::service_fn, Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use notification_hooks::NotificationPreferences;
use percent_encoding::percent_decode_str;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use stats::unix_timestamp;
use stats_history::SeriesId;
use std::{convert::Infallible, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{MonitorClient, MonitorError, ValidationError, ViewStorage};

/// Default trailing window for history queries: 24h.
const DEFAULT_HISTORY_WINDOW_SECS: u64 = 86_400;

pub async fn run_http_server(
    address: String,
    view: Arc<ViewStorage>,
    client: MonitorClient,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&address).await?;
    info!("HTTP API listening on http://{}", address);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let view = view.clone();
        let client = client.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let view = view.clone();
                let client = client.clone();
                async move { handle_request(req, view, client).await }
            });

            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    view: Arc<ViewStorage>,
    client: MonitorClient,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(json_error(
                StatusCode::BAD_REQUEST,
                &format!("Failed to read body: {}", e),
            ))
        }
    };

    Ok(route(&method, &path, &query, body, &view, &client).await)
}

/// Dispatch one request. Split from the hyper plumbing so it can be driven
/// directly.
pub async fn route(
    method: &Method,
    path: &str,
    query: &str,
    body: Bytes,
    view: &ViewStorage,
    client: &MonitorClient,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => serve_health(view),
        (&Method::GET, "/api/snapshot") => match view.get() {
            Some(v) => match &v.snapshot {
                Some(snapshot) => json_response(StatusCode::OK, snapshot),
                None => json_error(StatusCode::SERVICE_UNAVAILABLE, "no data available"),
            },
            None => json_error(StatusCode::SERVICE_UNAVAILABLE, "no data available"),
        },
        (&Method::GET, "/api/workers") => match view.get() {
            Some(v) => json_response(StatusCode::OK, &v.workers),
            None => json_response(StatusCode::OK, &json!([])),
        },
        (&Method::GET, "/api/activity") => serve_activity(view, query),
        (&Method::POST, "/api/activity/read") => {
            let request: MarkReadRequest = if body.is_empty() {
                MarkReadRequest::default()
            } else {
                match parse_body(&body) {
                    Ok(request) => request,
                    Err(e) => return validation_error(e),
                }
            };
            match client.mark_read(request.id).await {
                Ok(marked) => json_response(StatusCode::OK, &json!({ "marked": marked })),
                Err(e) => monitor_error(e),
            }
        }
        (&Method::GET, "/api/analytics") => match view.get() {
            Some(v) => json_response(StatusCode::OK, &v.analytics),
            None => json_error(StatusCode::SERVICE_UNAVAILABLE, "no data available"),
        },
        (&Method::GET, "/api/preferences") => match view.get() {
            Some(v) => json_response(StatusCode::OK, &v.preferences),
            None => json_response(StatusCode::OK, &NotificationPreferences::default()),
        },
        (&Method::PUT, "/api/preferences") => {
            let preferences: NotificationPreferences = match parse_body(&body) {
                Ok(preferences) => preferences,
                Err(e) => return validation_error(e),
            };
            match client.set_preferences(preferences).await {
                Ok(()) => json_response(StatusCode::OK, &preferences),
                Err(e) => monitor_error(e),
            }
        }
        (&Method::POST, "/api/expected-hashrate") => {
            let request: ExpectedHashrateRequest = match parse_body(&body) {
                Ok(request) => request,
                Err(e) => return validation_error(e),
            };
            match client
                .set_expected_hashrate(request.worker.clone(), request.ths)
                .await
            {
                Ok(()) => json_response(StatusCode::OK, &request),
                Err(e) => monitor_error(e),
            }
        }
        (&Method::DELETE, path) if path.starts_with("/api/expected-hashrate/") => {
            match path_worker(path, "/api/expected-hashrate/") {
                Ok(worker) => removal_response(client.remove_expected_hashrate(worker).await),
                Err(response) => response,
            }
        }
        (&Method::POST, "/api/worker-url") => {
            let request: WorkerUrlRequest = match parse_body(&body) {
                Ok(request) => request,
                Err(e) => return validation_error(e),
            };
            match client
                .set_worker_url(request.worker.clone(), request.url.clone())
                .await
            {
                Ok(()) => json_response(StatusCode::OK, &request),
                Err(e) => monitor_error(e),
            }
        }
        (&Method::DELETE, path) if path.starts_with("/api/worker-url/") => {
            match path_worker(path, "/api/worker-url/") {
                Ok(worker) => removal_response(client.remove_worker_url(worker).await),
                Err(response) => response,
            }
        }
        (&Method::PUT, "/api/poll-interval") => {
            let request: PollIntervalRequest = match parse_body(&body) {
                Ok(request) => request,
                Err(e) => return validation_error(e),
            };
            match client.set_poll_interval(request.secs).await {
                Ok(()) => json_response(StatusCode::OK, &request),
                Err(e) => monitor_error(e),
            }
        }
        (&Method::GET, path) if path.starts_with("/api/history/") => {
            serve_history(view, path.trim_start_matches("/api/history/"), query)
        }
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    }
}

#[derive(Debug, Default, Deserialize)]
struct MarkReadRequest {
    #[serde(default)]
    id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExpectedHashrateRequest {
    worker: String,
    ths: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkerUrlRequest {
    worker: String,
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PollIntervalRequest {
    secs: u64,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ValidationError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

fn validation_error(error: ValidationError) -> Response<Full<Bytes>> {
    json_error(StatusCode::BAD_REQUEST, &error.to_string())
}

fn monitor_error(error: MonitorError) -> Response<Full<Bytes>> {
    match error {
        MonitorError::Validation(e) => validation_error(e),
        MonitorError::Unavailable => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, &error.to_string())
        }
        MonitorError::Storage(_) => {
            error!("Request failed: {}", error);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

/// Worker names arrive percent-encoded in the path (`rig%201`).
fn path_worker(path: &str, prefix: &str) -> Result<String, Response<Full<Bytes>>> {
    let encoded = path.trim_start_matches(prefix);
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|worker| worker.into_owned())
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "worker name is not valid UTF-8"))
}

fn removal_response(result: Result<bool, MonitorError>) -> Response<Full<Bytes>> {
    match result {
        Ok(true) => json_response(StatusCode::OK, &json!({ "removed": true })),
        Ok(false) => json_error(StatusCode::NOT_FOUND, "unknown worker"),
        Err(e) => monitor_error(e),
    }
}

fn serve_health(view: &ViewStorage) -> Response<Full<Bytes>> {
    let stale = view.is_stale();
    let status_code = if stale {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let last_error = view.get().and_then(|v| v.last_error.clone());
    json_response(
        status_code,
        &json!({
            "healthy": !stale,
            "stale": stale,
            "last_error": last_error,
        }),
    )
}

/// Parse a single numeric query parameter
fn query_param(query: &str, name: &str) -> Option<u64> {
    query
        .split('&')
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.parse().ok())
}

fn serve_activity(view: &ViewStorage, query: &str) -> Response<Full<Bytes>> {
    let view = match view.get() {
        Some(view) => view,
        None => return json_response(StatusCode::OK, &json!({ "unread": 0, "events": [] })),
    };
    let limit = query_param(query, "limit")
        .map(|l| l as usize)
        .unwrap_or(view.activity.len());
    let events: Vec<_> = view.activity.iter().take(limit).collect();
    json_response(
        StatusCode::OK,
        &json!({ "unread": view.unread_count, "events": events }),
    )
}

fn serve_history(view: &ViewStorage, series: &str, query: &str) -> Response<Full<Bytes>> {
    let id: SeriesId = match series.parse() {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
    };
    let window = query_param(query, "window").unwrap_or(DEFAULT_HISTORY_WINDOW_SECS);
    let view = match view.get() {
        Some(view) => view,
        None => return json_error(StatusCode::SERVICE_UNAVAILABLE, "no data available"),
    };

    match view.history.query_json(&id, window, unix_timestamp()) {
        Some(points) => json_response(
            StatusCode::OK,
            &json!({ "series": id.to_string(), "window": window, "data": points }),
        ),
        None => json_error(StatusCode::NOT_FOUND, "unknown worker"),
    }
}
