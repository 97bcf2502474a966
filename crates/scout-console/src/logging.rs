use crate::capture::{LogCapture, MIRROR_TARGET};

/// Initialize logging. When `capture` is given its layer joins the stack, so
/// events reach both the terminal and the active session.
pub fn initialize_logging(verbose: bool, capture: Option<&LogCapture>) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("scout_core={}", level).parse().unwrap())
        .add_directive(format!("scout_console={}", level).parse().unwrap())
        .add_directive(format!("scout_config={}", level).parse().unwrap())
        .add_directive(format!("{}={}", MIRROR_TARGET, level).parse().unwrap());

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(capture.map(LogCapture::layer))
        .with(filter)
        .try_init();
}
