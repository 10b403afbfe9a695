use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::get,
};
use profilecache_storage::DynStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::AppConfig,
    create_store, handlers,
    identity::{HttpIdentityProvider, IdentityProvider},
    leaderboard::Leaderboard,
    middleware as app_middleware,
    profiles::ProfileService,
};

/// Shared handler state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub profiles: ProfileService,
    pub leaderboard: Leaderboard,
    pub store: DynStore,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wires the profile service and leaderboard over `store` and `provider`.
    pub fn new(config: AppConfig, store: DynStore, provider: Arc<dyn IdentityProvider>) -> Self {
        let profiles = ProfileService::new(store.clone(), provider)
            .with_key_space(config.store.key_space())
            .with_schema(config.store.fields.clone());
        let leaderboard =
            Leaderboard::new(Arc::new(profiles.clone())).with_limit(config.leaderboard.limit);
        Self {
            profiles,
            leaderboard,
            store,
            config: Arc::new(config),
        }
    }
}

pub struct ProfileCacheServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(state: AppState) -> Router {
    let timeout = state.config.request_timeout();
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        // Profiles and scores; the static `incr` segment wins over `{subject}`
        .route("/user/incr", get(handlers::increment_score))
        .route("/user/", get(handlers::missing_subject))
        .route("/user/{subject}", get(handlers::get_user))
        .route("/users", get(handlers::list_users))
        .route("/top-scores", get(handlers::top_scores))
        .route_layer(middleware::from_fn(app_middleware::http_metrics))
        .with_state(state)
        // Middleware stack (inner to outer: timeout -> trace -> request id -> cors)
        .layer(middleware::from_fn_with_state(
            timeout,
            app_middleware::request_timeout,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynStore>,
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
            provider: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use `store` instead of the one selected by `store.backend`.
    pub fn with_store(mut self, store: DynStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Connects the store (unless one was injected) and assembles the router.
    pub async fn build(self) -> anyhow::Result<ProfileCacheServer> {
        let store = match self.store {
            Some(store) => store,
            None => create_store(&self.config).await?,
        };
        let provider: Arc<dyn IdentityProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(HttpIdentityProvider::new(&self.config.identity_provider)?),
        };

        tracing::info!(
            backend = store.backend_name(),
            key_prefix = %self.config.store.key_prefix,
            leaderboard_limit = self.config.leaderboard.limit,
            "Profile store ready"
        );

        let app = build_app(AppState::new(self.config, store, provider));
        Ok(ProfileCacheServer {
            addr: self.addr,
            app,
        })
    }
}

impl ProfileCacheServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
