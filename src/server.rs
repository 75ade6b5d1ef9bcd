use crate::{
    config::{Config, CorsConfig},
    model_service::ModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

#[derive(Clone)]
pub struct SharedState {
    pub model: Arc<dyn ModelService>,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(model: Arc<dyn ModelService>, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics = Arc::new(Metrics::new());
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let app_state = SharedState { model, metrics };

        let router = Router::new()
            .merge(api_routes())
            .with_state(app_state)
            .layer(cors_layer(&config.cors)?)
            .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
            .layer(metrics_layer);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let server_handle = tokio::spawn(async move {
            axum::serve(self.listener, self.router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}

/// Browser access is limited to the one deployed frontend. Requested
/// methods and headers are mirrored back because the allow list cannot be
/// wildcarded once credentials are on.
fn cors_layer(cors: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = cors.allowed_origin.parse()?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorsConfig;

    #[test]
    fn cors_layer_accepts_a_well_formed_origin() {
        let cors = CorsConfig {
            allowed_origin: "https://deep-fake-face-detection.vercel.app".to_string(),
        };
        assert!(cors_layer(&cors).is_ok());
    }

    #[test]
    fn cors_layer_rejects_an_origin_with_control_characters() {
        let cors = CorsConfig {
            allowed_origin: "https://bad\norigin".to_string(),
        };
        assert!(cors_layer(&cors).is_err());
    }
}
