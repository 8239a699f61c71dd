use std::{convert::Infallible, future::Future, io, net::SocketAddr};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    body,
    header::{self, HeaderValue, CONTENT_TYPE, LOCATION},
    server::conn::http1,
    Method, Request, Response, StatusCode,
};
use hyper_util::{rt::TokioIo, server::graceful::GracefulShutdown, service::TowerToHyperService};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    application::api::{
        error::ApiError,
        person::person_router::{self, ApiResponse},
    },
    domain::person::PersonManager,
};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

pub struct MainRouter {
    person_manager: PersonManager,
    strict_not_found: bool,
}

impl MainRouter {
    pub fn new(person_manager: PersonManager, strict_not_found: bool) -> Self {
        return Self {
            person_manager,
            strict_not_found,
        };
    }

    /// Serves until Ctrl-C or SIGTERM, then waits for open connections to finish.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(%addr, "people api listening");
        self.serve(listener, shutdown_signal()).await;
        Ok(())
    }

    /// Accepts connections until `shutdown` resolves. Connections are then asked to
    /// close once their in-flight request is answered; idle keep-alive connections
    /// close at once.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("accept error: {e}");
                            continue;
                        }
                    };
                    // Use an adapter to access something implementing `tokio::io` traits as if they implement
                    // `hyper::rt` IO traits.
                    let io = TokioIo::new(stream);

                    let person_manager_cloned = self.person_manager.clone();
                    let strict_not_found = self.strict_not_found;
                    let cors = CorsLayer::new()
                        .allow_origin(AllowOrigin::any())
                        .allow_methods(vec![
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(vec![header::CONTENT_TYPE]);
                    let service = ServiceBuilder::new().layer(cors).service_fn(move |r| {
                        let person_manager_cloned = person_manager_cloned.clone();
                        async move {
                            Ok::<Response<BoxBody>, Infallible>(
                                handle_request(r, person_manager_cloned, strict_not_found).await,
                            )
                        }
                    });
                    let connection = graceful.watch(
                        http1::Builder::new().serve_connection(io, TowerToHyperService::new(service)),
                    );
                    tokio::spawn(async move {
                        if let Err(err) = connection.await {
                            error!(%peer, "Error serving connection: {:?}", err);
                        }
                    });
                }
            }
        }

        graceful.shutdown().await;
        info!("people api stopped");
    }
}

async fn handle_request(
    request: Request<body::Incoming>,
    person_manager: PersonManager,
    strict_not_found: bool,
) -> Response<BoxBody> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let whole_body = match request.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(%method, %path, "cannot read request body: {:?}", e);
            return status_only(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    route_requests(&method, &path, whole_body, &person_manager, strict_not_found).await
}

/// Dispatches one request on its method, path and raw body.
async fn route_requests(
    method: &Method,
    path: &str,
    whole_body: Bytes,
    person_manager: &PersonManager,
    strict_not_found: bool,
) -> Response<BoxBody> {
    let body: Value = serde_json::from_slice(&whole_body).unwrap_or(Value::Null);
    let mut splitted_path = path.split('/').skip(1);
    let result = match (splitted_path.next(), splitted_path.next()) {
        (Some(api), Some(resource))
            if api.eq_ignore_ascii_case("api") && resource.eq_ignore_ascii_case("people") =>
        {
            let partial_path = splitted_path.collect::<Vec<&str>>().join("/");
            person_router::router(
                &partial_path,
                method,
                body,
                person_manager,
                strict_not_found,
            )
            .await
        }
        _ => Err(ApiError::NotFound(format!("no route for {}", path))),
    };
    let response = result.and_then(into_response).unwrap_or_else(|e| {
        match &e {
            ApiError::Internal(_) => error!(%method, %path, "{}", e),
            _ => info!(%method, %path, "{}", e),
        }
        status_only(e.status())
    });
    info!(%method, %path, status = response.status().as_u16(), "request handled");
    response
}

fn into_response(api_response: ApiResponse) -> Result<Response<BoxBody>, ApiError> {
    let mut response = match api_response.body {
        Some(body) => {
            let json = serde_json::to_string(&body)
                .map_err(|e| ApiError::Internal(format!("cannot serialize response: {}", e)))?;
            let mut response = Response::new(full(json));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        None => Response::new(full(Bytes::new())),
    };
    *response.status_mut() = api_response.status;
    if let Some(location) = api_response.location {
        response
            .headers_mut()
            .insert(LOCATION, HeaderValue::from_static(location));
    }
    Ok(response)
}

fn status_only(status: StatusCode) -> Response<BoxBody> {
    let mut response = Response::new(full(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
