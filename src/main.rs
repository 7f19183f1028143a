use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ride_dispatch::api;
use ride_dispatch::config::Config;
use ride_dispatch::error::AppError;
use ride_dispatch::messaging::amqp::RabbitMq;
use ride_dispatch::messaging::memory::InMemoryBroker;
use ride_dispatch::messaging::topology::Topology;
use ride_dispatch::messaging::SharedBroker;
use ride_dispatch::pricing::routing::{OsrmRouteProvider, RouteProvider, StraightLineRouteProvider};
use ride_dispatch::state::AppState;
use ride_dispatch::supervisor::{supervise, Shutdown};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let topology = Topology::dispatch();
    let broker: SharedBroker = match &config.rabbitmq_uri {
        Some(uri) => Arc::new(RabbitMq::connect(uri, &topology).await?),
        None => {
            tracing::warn!("RABBITMQ_URI not set; using the in-process broker");
            Arc::new(InMemoryBroker::new(&topology))
        }
    };

    let routes: Arc<dyn RouteProvider> = match &config.osrm_url {
        Some(url) => Arc::new(OsrmRouteProvider::new(
            url,
            Duration::from_millis(config.routing_timeout_ms),
        )?),
        None => Arc::new(StraightLineRouteProvider::default()),
    };

    let shared_state = Arc::new(AppState::new(
        broker.clone(),
        routes,
        config.event_buffer_size,
    ));

    let shutdown = Shutdown::new();

    let consumer = supervise(
        "trip consumer",
        tokio::spawn(shared_state.trip_consumer().run(shutdown.subscribe())),
        shutdown.clone(),
    );
    let relay = supervise(
        "notification relay",
        tokio::spawn(shared_state.notification_relay().run(shutdown.subscribe())),
        shutdown.clone(),
    );

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    // Stops on Ctrl-C, or as soon as a consumer dies.
    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.signalled().await })
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")));

    shutdown.trigger();
    let mut failure = served.err();
    for task in [consumer, relay] {
        let result = task
            .await
            .map_err(|err| AppError::Internal(format!("supervisor aborted: {err}")))
            .and_then(|result| result);
        if let Err(err) = result {
            failure.get_or_insert(err);
        }
    }

    broker.close().await?;
    tracing::info!("shutdown complete");

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
