use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use riglink_core::{Controller, CoreConfig};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{core_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_record, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let link = args.link.link_config()?;
    let interval = parse_duration(&args.poll)?;
    let config = CoreConfig {
        initial_mode: args.mode,
        ..CoreConfig::default()
    };

    let controller =
        Controller::open(&link, config).map_err(|err| core_error("open failed", err))?;
    info!(%link, transport = link.transport_name(), mode = %args.mode, "serving");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        for record in controller.queue().drain_published() {
            print_record(&record, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                controller.shutdown();
                return Ok(SUCCESS);
            }
        }

        if controller.receiver_status().iter().all(|status| !status.running) {
            warn!(%link, "receiver stopped");
            controller.shutdown();
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("link {link} closed"),
            ));
        }

        thread::sleep(interval);
    }

    let stats = controller.dispatch_stats();
    info!(
        frames = stats.frames,
        crc_failures = stats.crc_failures,
        forwarded = stats.forwarded,
        printed,
        "serve stopped"
    );
    controller.shutdown();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
