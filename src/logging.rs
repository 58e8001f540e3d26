use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// HTTP and pool internals stay at `warn` unless the filter asks otherwise.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,bb8=warn,httpmock=warn";

pub fn init_tracing(component: &str) {
    let default_filter =
        format!("info,creator_pilot=debug,{component}=debug,{QUIET_DEPENDENCIES}");

    let filter = std::env::var("CREATOR_PILOT_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);

    // Structured output for log shippers; compact text otherwise.
    let _ = if json_requested(std::env::var("CREATOR_PILOT_LOG_FORMAT").ok().as_deref()) {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_thread_ids(true).compact().try_init()
    };
}

fn json_requested(format: Option<&str>) -> bool {
    format.is_some_and(|value| value.trim().eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_selection() {
        assert!(json_requested(Some("JSON")));
        assert!(!json_requested(Some("compact")));
        assert!(!json_requested(None));
    }
}
