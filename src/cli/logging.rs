use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a `-v` count. `RUST_LOG` wins when set.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info,form_autofill::passwords=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Safe to call once per process; later
/// calls are ignored.
pub fn init_logging(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(2), "debug");
        assert_eq!(default_filter(9), "trace");
        assert!(EnvFilter::try_new(default_filter(1)).is_ok());
    }
}
