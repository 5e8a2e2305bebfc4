use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "report_service=info,sms_client=info";

/// Install the fmt subscriber. `RUST_LOG` overrides the default directives.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
