use tracing_subscriber::EnvFilter;

/// Initialize the process-wide tracing subscriber. `RUST_LOG` drives the
/// filter; `TESTEXEC_LOG_JSON=1` switches to json lines for log shipping.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TESTEXEC_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    if json {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}
