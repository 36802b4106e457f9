//! Tracing subscriber setup for the binary.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs a stderr fmt subscriber. `debug` selects the DEBUG level,
/// INFO otherwise. Calling it twice keeps the first subscriber.
pub fn init(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
