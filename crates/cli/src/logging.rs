use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Directives used when `RUST_LOG` is unset.
///
/// Only pairlink's own crates and the request tracer get louder; `pairlink`
/// also matches the `pairlink_runtime` and `pairlink_cli` targets.
fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		// warnings and cleanup problems only
		0 => "warn",
		// -v: session lifecycle and requests
		1 => "warn,pairlink=info,tower_http=info",
		// -vv: transitions and timers
		2 => "info,pairlink=debug,tower_http=debug",
		// -vvv: bridge frames as well
		_ => "info,pairlink=trace,tower_http=debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
