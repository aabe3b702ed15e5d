use crate::gui_bridge::model::ViewDesk;
use lightcore::acquisition::{Progress, SessionMonitor};
use lightcore::prelude::ScanError;
use lightcore::processing::{MappingFunction, ViewHandle};
use lightcore::storage::DirectorySink;
use lightcore::telemetry::MetricsSnapshot;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::runtime::Builder;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

pub type SharedDesk = Arc<Mutex<ViewDesk>>;

#[derive(Debug, Serialize)]
struct StatusModel {
    progress: Option<Progress>,
    metrics: Option<MetricsSnapshot>,
    open_views: usize,
}

#[derive(Debug, Deserialize)]
struct OpenRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MappingRequest {
    mapping: MappingFunction,
}

/// HTTP surface for external renderers: session status, stored batches and
/// the open views with their mapped grids.
pub struct GuiBridge {
    desk: SharedDesk,
}

impl GuiBridge {
    pub fn new(
        desk: SharedDesk,
        sink: DirectorySink,
        monitor: Option<SessionMonitor>,
        address: SocketAddr,
    ) -> Self {
        let routes = routes(desk.clone(), sink, monitor);
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("cannot start bridge runtime: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                warp::serve(routes).run(address).await;
            });
        });
        info!("renderer bridge listening on http://{}", address);

        Self { desk }
    }

    pub fn publish_status(&self, message: &str) {
        let open = self.desk.lock().map(|desk| desk.handles().len()).unwrap_or(0);
        info!("[bridge] {} ({} view(s) open)", message, open);
    }
}

type Reply = WithStatus<Json>;

fn reply(body: serde_json::Value, status: StatusCode) -> Reply {
    warp::reply::with_status(warp::reply::json(&body), status)
}

fn error_reply(err: &ScanError) -> Reply {
    let status = match err {
        ScanError::UnknownView(_) => StatusCode::NOT_FOUND,
        ScanError::AlreadyRegistered(_) => StatusCode::CONFLICT,
        ScanError::Reconstruction { .. } | ScanError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    reply(json!({ "error": err.to_string() }), status)
}

fn poisoned() -> Reply {
    reply(
        json!({ "error": "view registry unavailable" }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

fn with_value<T>(value: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone
where
    T: Clone + Send + Sync + 'static,
{
    warp::any().map(move || value.clone())
}

pub fn routes(
    desk: SharedDesk,
    sink: DirectorySink,
    monitor: Option<SessionMonitor>,
) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_value(desk.clone()))
        .and(with_value(monitor))
        .map(|desk: SharedDesk, monitor: Option<SessionMonitor>| {
            let open_views = desk.lock().map(|desk| desk.handles().len()).unwrap_or(0);
            let model = StatusModel {
                progress: monitor.as_ref().map(SessionMonitor::progress),
                metrics: monitor.as_ref().map(SessionMonitor::metrics),
                open_views,
            };
            reply(json!(model), StatusCode::OK)
        });

    let batches = warp::path("batches")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_value(sink.clone()))
        .map(|sink: DirectorySink| match sink.list() {
            Ok(names) => reply(json!(names), StatusCode::OK),
            Err(err) => error_reply(&err),
        });

    let list_views = warp::path("views")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_value(desk.clone()))
        .map(|desk: SharedDesk| {
            let Ok(desk) = desk.lock() else {
                return poisoned();
            };
            reply(
                json!({ "range": desk.range(), "views": desk.snapshot() }),
                StatusCode::OK,
            )
        });

    let open_view = warp::path("views")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_value(desk.clone()))
        .and(with_value(sink))
        .map(|request: OpenRequest, desk: SharedDesk, sink: DirectorySink| {
            let lines = match sink.load(&request.name) {
                Ok(lines) => lines,
                Err(err) => return reply(json!({ "error": err.to_string() }), StatusCode::NOT_FOUND),
            };
            let reconstructor = match desk.lock() {
                Ok(desk) => desk.reconstructor(),
                Err(_) => return poisoned(),
            };
            let grid = match reconstructor.reconstruct(&lines) {
                Ok(grid) => grid,
                Err(err) => {
                    error!("cannot open view '{}': {}", request.name, err);
                    return error_reply(&err);
                }
            };
            let Ok(mut desk) = desk.lock() else {
                return poisoned();
            };
            match desk.register(&request.name, grid) {
                Ok(handle) => reply(
                    json!({ "id": handle, "range": desk.range() }),
                    StatusCode::CREATED,
                ),
                Err(err) => {
                    error!("cannot open view '{}': {}", request.name, err);
                    error_reply(&err)
                }
            }
        });

    let close_view = warp::path!("views" / u64)
        .and(warp::delete())
        .and(with_value(desk.clone()))
        .map(|id: u64, desk: SharedDesk| {
            let Ok(mut desk) = desk.lock() else {
                return poisoned();
            };
            match desk.close(ViewHandle::from_raw(id)) {
                Ok(()) => reply(json!({ "range": desk.range() }), StatusCode::OK),
                Err(err) => error_reply(&err),
            }
        });

    let set_mapping = warp::path("mapping")
        .and(warp::path::end())
        .and(warp::put())
        .and(warp::body::json())
        .and(with_value(desk))
        .map(|request: MappingRequest, desk: SharedDesk| {
            let Ok(mut desk) = desk.lock() else {
                return poisoned();
            };
            desk.set_mapping(request.mapping);
            reply(json!({ "mapping": request.mapping }), StatusCode::OK)
        });

    status
        .or(batches)
        .unify()
        .or(list_views)
        .unify()
        .or(open_view)
        .unify()
        .or(close_view)
        .unify()
        .or(set_mapping)
        .unify()
}
