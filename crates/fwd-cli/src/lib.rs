pub mod cli;
pub mod run;

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `verbosity`
/// shifts the default level up (positive) or down (negative) from `info`.
pub fn init_tracing(verbosity: i8) {
    let default_level = match verbosity {
        i8::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
