use std::future::Future;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::postprocess::OsEntropy;
use crate::router;
use crate::store::PgProfileStore;

/// Connect and seed the profile store, then serve until `shutdown` resolves.
/// Failing to initialize the store is returned before the listener accepts anything.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = PgProfileStore::connect(
        config.connect_options(),
        config.pool_settings(),
        config.retry_policy(),
    )
    .await
    .wrap_err("failed to connect to profile store")?;

    store
        .bootstrap()
        .await
        .wrap_err("failed to initialize profile store")?;

    let pipeline = Pipeline::new(Arc::new(store), Arc::new(OsEntropy));
    let app = router::router(
        pipeline,
        config.request_timeout_ms.0,
        config.export_prometheus,
    );

    tracing::info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .wrap_err("server error")?;

    Ok(())
}
