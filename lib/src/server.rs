use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hyper::body::to_bytes;
use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dataset::{CleanPayload, Dataset};
use crate::error::{Error, Result};
use crate::insight::{InsightClient, InsightRequest, Provider};
use crate::ml::MlClient;
use crate::series::{self, DRAW_LIMIT, HISTOGRAM_BINS, MAX_HISTOGRAM_BINS};
use crate::store::DatasetStore;
use crate::summary::summarize;
use crate::timeseries::Aggregation;

/// Shared state behind the dashboard API.
#[derive(Clone)]
pub struct AppState {
    pub store: DatasetStore,
    pub ml: Arc<MlClient>,
    pub insight: Arc<InsightClient>,
}

#[derive(Debug, Deserialize)]
struct InsightBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Bind the API server to `addr` and return the bound address along with
/// the future that runs it until `shutdown` resolves.
pub fn bind<S>(
    addr: &SocketAddr,
    state: AppState,
    shutdown: S,
) -> Result<(SocketAddr, impl Future<Output = hyper::Result<()>>)>
where
    S: Future<Output = ()> + Send + 'static,
{
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req)))
        }
    });

    let server = Server::try_bind(addr)?.serve(make_svc);
    let local = server.local_addr();
    log::info!("listening on http://{}", local);
    Ok((local, server.with_graceful_shutdown(shutdown)))
}

async fn handle(state: AppState, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let target = format!("{} {}", req.method(), req.uri().path());
    log::debug!("{}", target);
    let res = match route(&state, req).await {
        Ok(res) => res,
        Err(err) => {
            log::error!("{}: {}", target, err);
            error_response(&err)
        }
    };
    Ok(res)
}

async fn route(state: &AppState, req: Request<Body>) -> Result<Response<Body>> {
    let query = query_params(&req);
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').skip(1).collect();

    match (&method, segments.as_slice()) {
        (&Method::POST, ["api", "upload"]) => upload(state, &query, req).await,
        (&Method::POST, ["api", "insight"]) => insight(state, req).await,
        (&Method::POST, ["api", "datasets", id, "clean"]) => {
            let id = id.to_string();
            let body = to_bytes(req.into_body()).await?;
            let payload: CleanPayload = serde_json::from_slice(&body)?;
            state.store.put(id, Dataset::from(payload)).await;
            json_response(StatusCode::OK, &json!({"ok": true}))
        }
        (&Method::GET, ["api", "datasets", id, "clean"]) => {
            json_response(StatusCode::OK, &json!({"ok": true, "dataset": id}))
        }
        (&Method::GET, ["api", "datasets", id, "scatter"]) => {
            let dataset = dataset(state, id).await?;
            let x = query.get("x").cloned().unwrap_or_default();
            let y = query.get("y").cloned().unwrap_or_default();
            let threshold = query
                .get("threshold")
                .and_then(|t| t.parse().ok())
                .unwrap_or(DRAW_LIMIT);
            let points = series::scatter(&dataset.rows, &x, &y, threshold);
            json_response(StatusCode::OK, &json!({"x": x, "y": y, "points": points}))
        }
        (&Method::GET, ["api", "datasets", id, "trend"]) => {
            let dataset = dataset(state, id).await?;
            let param = query.get("param").cloned().unwrap_or_default();
            let agg: Aggregation = match query.get("agg") {
                Some(agg) => agg.parse()?,
                None => Aggregation::default(),
            };
            let points = match dataset.time_key() {
                Some(key) => series::trend(&dataset.rows, &key, &param, agg),
                None => Vec::new(),
            };
            json_response(
                StatusCode::OK,
                &json!({"param": param, "agg": agg, "points": points}),
            )
        }
        (&Method::GET, ["api", "datasets", id, "histogram"]) => {
            let dataset = dataset(state, id).await?;
            let param = query.get("param").cloned().unwrap_or_default();
            let bins = match query.get("bins") {
                None => HISTOGRAM_BINS,
                Some(raw) => match raw.parse::<usize>() {
                    Ok(bins) if (1..=MAX_HISTOGRAM_BINS).contains(&bins) => bins,
                    _ => {
                        return Err(Error::InvalidParameter {
                            name: "bins",
                            value: raw.clone(),
                        })
                    }
                },
            };
            let values = series::column_values(&dataset.rows, &param);
            let bins = series::histogram(&values, bins);
            json_response(StatusCode::OK, &json!({"param": param, "bins": bins}))
        }
        (&Method::GET, ["api", "datasets", id, "summary"]) => {
            let dataset = dataset(state, id).await?;
            let summary = summarize(&dataset.rows, &dataset.schema);
            json_response(StatusCode::OK, &summary)
        }
        _ => json_response(StatusCode::NOT_FOUND, &json!({"error": "Not found"})),
    }
}

async fn upload(
    state: &AppState,
    query: &HashMap<String, String>,
    req: Request<Body>,
) -> Result<Response<Body>> {
    let csv = to_bytes(req.into_body()).await?;
    if csv.is_empty() {
        return json_response(StatusCode::BAD_REQUEST, &json!({"error": "No file"}));
    }
    let id = query
        .get("dataset_id")
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(default_dataset_id);

    let payload = match state.ml.process(csv, &id).await {
        Ok(payload) => payload,
        Err(err) => {
            log::error!("ml service failed for {}: {}", id, err);
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"error": "ML service failed"}),
            );
        }
    };
    state.store.put(id, Dataset::from(payload.clone())).await;
    json_response(StatusCode::OK, &payload)
}

async fn insight(state: &AppState, req: Request<Body>) -> Result<Response<Body>> {
    let body = to_bytes(req.into_body()).await?;
    let body: InsightBody = serde_json::from_slice(&body)?;
    let provider: Provider = match body.provider.as_deref() {
        Some(p) => p.parse()?,
        None => Provider::default(),
    };
    let request = InsightRequest {
        prompt: body.prompt,
        category: body.category,
        payload: body.payload,
    };

    match state.insight.ask(provider, &request).await {
        Ok(text) => json_response(StatusCode::OK, &json!({"text": text})),
        Err(Error::Status { status, body }) => {
            log::warn!("{} returned {}", provider, status);
            let detail = serde_json::from_str(&body).unwrap_or(Value::String(body));
            json_response(
                StatusCode::BAD_GATEWAY,
                &json!({
                    "error": format!("{} API failed", provider.display_name()),
                    "detail": detail,
                }),
            )
        }
        Err(err) => Err(err),
    }
}

async fn dataset(state: &AppState, id: &str) -> Result<Arc<Dataset>> {
    state
        .store
        .get(id)
        .await
        .ok_or_else(|| Error::UnknownDataset(id.to_string()))
}

fn default_dataset_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

fn query_params(req: &Request<Body>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn json_response<T: serde::Serialize + ?Sized>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Body>> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn error_response(err: &Error) -> Response<Body> {
    let (status, message) = match err {
        Error::UnknownDataset(_) => (StatusCode::NOT_FOUND, "Unknown dataset".to_string()),
        Error::InvalidProvider(_) => (StatusCode::BAD_REQUEST, "Invalid provider".to_string()),
        Error::InvalidAggregation(_) | Error::InvalidParameter { .. } | Error::Json(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        Error::MissingApiKey(provider) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Missing {}_API_KEY", provider.to_string().to_uppercase()),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    json_response(status, &json!({ "error": message })).unwrap_or_else(|_| {
        let mut res = Response::new(Body::from("internal server error"));
        *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        res
    })
}
