use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use tokio::net::ToSocketAddrs;
use tokio::sync::RwLock;

use crate::monitor::ContainerInfo;
use crate::sampler::Sample;

mod models;

pub use models::{ContainersResponse, SamplesResponse};

#[derive(Debug, Default)]
struct Round {
    timestamp: Option<u64>,
    samples: Vec<Sample>,
    containers: Vec<ContainerInfo>,
}

/// The most recent sampling round, shared between the sampling loop and the API server.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    latest: Arc<RwLock<Round>>,
}

impl SampleStore {
    /// Replaces the stored round.
    pub async fn publish(
        &self,
        timestamp: u64,
        samples: Vec<Sample>,
        containers: Vec<ContainerInfo>,
    ) {
        *self.latest.write().await = Round {
            timestamp: Some(timestamp),
            samples,
            containers,
        };
    }

    async fn samples(&self) -> SamplesResponse {
        let round = self.latest.read().await;
        SamplesResponse {
            timestamp: round.timestamp,
            samples: round.samples.clone(),
        }
    }

    async fn containers(&self) -> ContainersResponse {
        ContainersResponse {
            containers: self.latest.read().await.containers.clone(),
        }
    }
}

async fn latest_samples(State(store): State<SampleStore>) -> Json<SamplesResponse> {
    Json(store.samples().await)
}

async fn tracked_containers(State(store): State<SampleStore>) -> Json<ContainersResponse> {
    Json(store.containers().await)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind API listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("API server failed: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(store: SampleStore) -> Self {
        let router = axum::Router::new()
            .route("/samples", get(latest_samples))
            .route("/containers", get(tracked_containers))
            .with_state(store);
        Self { router }
    }

    /// Serves the API until the server fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server stops.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(Error::Bind)?;
        log::info!(
            "serving samples on {}",
            listener
                .local_addr()
                .map_or_else(|_| "unknown address".to_owned(), |addr| addr.to_string())
        );
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(Error::Serve)
    }
}
