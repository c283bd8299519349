use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use crate::util::errors::{Error, Result};

/// Initialize tracing
///
/// Reconcile loops embedding this crate call this once at startup; a second call
/// reports an error instead of replacing the installed subscriber.
pub fn init() -> Result<()> {
    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;

    let collector = Registry::default().with(logger).with(env_filter);

    tracing::subscriber::set_global_default(collector).map_err(|e| Error::InvalidArgument(e.to_string()))
}
