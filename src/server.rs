use std::sync::{Arc, Mutex};

use axum::extract::{Query as UrlQuery, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::catalog::GranuleCatalog;
use crate::domain::Query;
use crate::error::TempoError;
use crate::geocode::Geocoder;
use crate::granule::GranuleReader;
use crate::service::QueryService;
use crate::transfer::GranuleTransfer;

pub const TEMPO_NO2_ROUTE: &str = "/api/tempo-no2";

pub type SharedService<G, C, T, R> = Arc<Mutex<QueryService<G, C, T, R>>>;

#[derive(Debug, Deserialize)]
pub struct TempoNo2Params {
    pub city: String,
    pub str_date: String,
    pub end_date: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn router<G, C, T, R>(
    service: SharedService<G, C, T, R>,
    allowed_origins: &[String],
) -> Result<Router, TempoError>
where
    G: Geocoder + 'static,
    C: GranuleCatalog + 'static,
    T: GranuleTransfer + 'static,
    R: GranuleReader + 'static,
{
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|err| TempoError::Server(format!("invalid origin {origin:?}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Ok(Router::new()
        .route(TEMPO_NO2_ROUTE, get(tempo_no2_handler::<G, C, T, R>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service))
}

pub async fn serve(listen: &str, app: Router) -> Result<(), TempoError> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|err| TempoError::Server(format!("bind {listen}: {err}")))?;
    info!(%listen, "serving {TEMPO_NO2_ROUTE}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| TempoError::Server(err.to_string()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

async fn tempo_no2_handler<G, C, T, R>(
    State(service): State<SharedService<G, C, T, R>>,
    UrlQuery(params): UrlQuery<TempoNo2Params>,
) -> Response
where
    G: Geocoder + 'static,
    C: GranuleCatalog + 'static,
    T: GranuleTransfer + 'static,
    R: GranuleReader + 'static,
{
    let query = Query::new(params.city, params.str_date, params.end_date);
    let result = tokio::task::spawn_blocking(move || {
        let service = service
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        service.run(&query)
    })
    .await;

    match result {
        Ok(Ok(outcome)) => Json(outcome.observations).into_response(),
        Ok(Err(err)) => {
            info!(%err, "query answered with error");
            Json(ErrorBody {
                error: err.to_string(),
            })
            .into_response()
        }
        Err(err) => {
            error!(%err, "query task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "internal error while processing query".to_string(),
                }),
            )
                .into_response()
        }
    }
}
