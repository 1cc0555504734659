use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{Error, ErrorDetails};

const DEFAULT_GATEWAY_DIRECTIVES: &str = "warn,gateway=info,verdict_core=info";

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Sets up the tracing subscriber for all gateway logs.
///
/// If `RUST_LOG` is set it takes precedence over the default directives.
pub fn setup_observability(log_format: LogFormat) -> Result<(), Error> {
    let env_var_name = "RUST_LOG";
    let filter = if std::env::var(env_var_name).is_ok() {
        EnvFilter::builder()
            .with_env_var(env_var_name)
            .from_env()
            .map_err(|e| {
                Error::new(ErrorDetails::Observability {
                    message: format!("Invalid `{env_var_name}` environment variable: {e}"),
                })
            })?
    } else {
        EnvFilter::builder()
            .parse(DEFAULT_GATEWAY_DIRECTIVES)
            .map_err(|e| {
                Error::new(ErrorDetails::Observability {
                    message: format!("Failed to parse default log directives: {e}"),
                })
            })?
    };

    tracing_subscriber::registry()
        .with(build_log_layer(log_format).with_filter(filter))
        .init();
    Ok(())
}

fn build_log_layer<S>(log_format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match log_format {
        LogFormat::Pretty => Box::new(tracing_subscriber::fmt::layer()),
        LogFormat::Json => Box::new(tracing_subscriber::fmt::layer().json()),
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::Registry;

    use super::*;

    #[test]
    fn test_build_log_layer_for_both_formats() {
        let _pretty = build_log_layer::<Registry>(LogFormat::Pretty);
        let _json = build_log_layer::<Registry>(LogFormat::Json);
    }
}
