use std::sync::Arc;

use tracing::{error, info, Subscriber};
use tracing_subscriber::{fmt, fmt::MakeWriter, prelude::*, reload, EnvFilter, Registry};

use planbridge_core::{
    config::Config,
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    AppContext,
};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Subscriber with a reloadable filter. Logs go to `writer`; stdout carries
/// JSON-RPC frames.
fn subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> (impl Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let (filter_layer, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(writer));
    (subscriber, handle)
}

/// Switch to the configured level unless RUST_LOG already picked one.
fn apply_configured_level(
    handle: &FilterHandle,
    config: &Config,
    rust_log_set: bool,
) -> Result<(), reload::Error> {
    if rust_log_set {
        return Ok(());
    }
    handle.reload(EnvFilter::new(
        config.logging.log_level().as_filter_directive(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let rust_log_set = env_filter.is_some();
    let (subscriber, reload_handle) = subscriber(
        env_filter.unwrap_or_else(|| EnvFilter::new("info")),
        std::io::stderr,
    );
    subscriber.init();

    let config = Config::load_default()?;
    apply_configured_level(&reload_handle, &config, rust_log_set)?;

    info!(
        config = %Config::resolved_path().display(),
        "Starting planbridge MCP server"
    );

    let ctx = AppContext::from_config(config)?;

    let server = McpServer::from_context(&ctx).with_level_hook(Arc::new(move |level| {
        reload_handle
            .reload(EnvFilter::new(level.as_filter_directive()))
            .map_err(|e| e.to_string())
    }));
    let handler = JsonRpcHandler::new(server);
    let transport = StdioTransport::new(handler);

    info!("MCP server ready, listening on stdio");

    if let Err(e) = transport.run().await {
        error!("Transport error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn bad_token_store(key: &str) -> Option<String> {
        (key == "PLANBRIDGE_TOKEN_STORE").then(|| "keychain".to_string())
    }

    #[test]
    fn override_warnings_are_logged_then_configured_level_applies() {
        let captured = Captured::default();
        let sink = captured.clone();
        let (subscriber, handle) = subscriber(EnvFilter::new("info"), move || sink.clone());

        tracing::subscriber::with_default(subscriber, || {
            let mut config = Config::default();
            config.apply_overrides(bad_token_store);
            tracing::debug!("before reload");

            config.logging.level = "debug".to_string();
            apply_configured_level(&handle, &config, false).unwrap();
            tracing::debug!("after reload");
        });

        let out = captured.contents();
        assert!(out.contains("Ignoring PLANBRIDGE_TOKEN_STORE"), "{}", out);
        assert!(!out.contains("before reload"));
        assert!(out.contains("after reload"));
    }

    #[test]
    fn rust_log_keeps_its_filter() {
        let captured = Captured::default();
        let sink = captured.clone();
        let (subscriber, handle) = subscriber(EnvFilter::new("warn"), move || sink.clone());

        tracing::subscriber::with_default(subscriber, || {
            let mut config = Config::default();
            config.logging.level = "debug".to_string();
            apply_configured_level(&handle, &config, true).unwrap();
            tracing::info!("quiet");
        });

        assert!(!captured.contents().contains("quiet"));
    }
}
