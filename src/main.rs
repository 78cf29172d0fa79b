// See the "macOS permissions note" in btleplug's README before running this
// on macOS Big Sur or later.

use std::error::Error;
use std::path::Path;

use bs444_scale::ble::BtleTransport;
use bs444_scale::clock::SystemClock;
use bs444_scale::config::Settings;
use bs444_scale::transport::Event;
use bs444_scale::{Acquisition, Options};
use btleplug::api::Manager as _;
use btleplug::platform::{Adapter, Manager};
use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle, Record};
use log::info;
use tokio::sync::mpsc;

async fn get_central(manager: &Manager) -> bs444_scale::Result<Adapter> {
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or(bs444_scale::Error::NoAdapter)
}

pub fn my_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{}: {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        &record.args()
    )
}

fn start_logger(settings: &Settings) -> bs444_scale::Result<LoggerHandle> {
    let handle = Logger::try_with_env_or_str(&settings.log_spec)?
        .log_to_file(
            FileSpec::default()
                .basename(&settings.log_basename)
                .suppress_timestamp(),
        )
        .duplicate_to_stdout(Duplicate::Debug)
        .append()
        .format_for_files(my_format)
        .print_message()
        .start()?;
    Ok(handle)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = match std::env::args_os().nth(1) {
        Some(path) => Settings::load(Path::new(&path))?,
        None => Settings::default(),
    };
    let _logger = start_logger(&settings)?;

    let manager = Manager::new().await?;

    // get the first bluetooth adapter
    let central = get_central(&manager).await?;

    // Transport callbacks and the tick both feed this queue; the loop below
    // is its only consumer.
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let transport = BtleTransport::new(central, events_tx);
    transport.listen().await?;

    let mut scale = Acquisition::new(
        transport,
        SystemClock,
        settings.router(),
        Options::from(&settings),
    );
    scale.start(settings.scan_enabled);

    let mut ticker = tokio::time::interval(settings.tick());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            now = ticker.tick() => scale.handle(Event::Tick(now.into_std())),
            Some(event) = events.recv() => scale.handle(event),
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
