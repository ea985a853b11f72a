use tracing::{error, info, info_span};
use tracing_ecs_log::init::init_tracing;

/// Run with `JSON_LOGGING=true` to get JSON lines; set
/// `ECS_CONTAINER_METADATA_FILE` to a metadata file to see the
/// container and cloud fields.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let appender = init_tracing()?;

    info!(target: "home", "hello");
    info!(target: "home", user_id = 42, plan = "pro", "user signed in");

    let span = info_span!("load_settings");
    let _entered = span.enter();
    if let Err(err) = "not a number".parse::<u16>() {
        error!(target: "home", error = &err as &(dyn std::error::Error + 'static), "hmm");
    }

    eprintln!(
        "{} events, {} dropped",
        appender.total_events.load(std::sync::atomic::Ordering::Relaxed),
        appender.dropped_events.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
