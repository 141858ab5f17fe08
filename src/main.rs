use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use uleds::abi::BRIGHTNESS_SIZE;
use uleds::client::Uleds;
use uleds::{
    Brightness, DeviceSession, LedClassRegistry, ReadMode, UledsError, UserDev, UserTrigger,
};

mod cli;

/// Print `[<sec>.<nsec>] <brightness>` with a monotonic timestamp
fn print_brightness(brightness: Brightness) {
    let ts = rustix::time::clock_gettime(rustix::time::ClockId::Monotonic);
    println!("[{}.{:09}] {}", ts.tv_sec, ts.tv_nsec, brightness);
}

/// Monitor a LED created through the kernel's uleds device
async fn monitor_device(args: &cli::Args) -> Result<()> {
    let mut uleds = Uleds::open(&args.device)?;
    uleds
        .setup(&args.name, args.max_brightness, args.setup.as_method())
        .context("Failed to set up LED")?;

    if let Some(ref trigger) = args.trigger {
        uleds
            .set_default_trigger(trigger)
            .context("Failed to set default trigger")?;
    }
    info!("monitoring {}", uleds.name());

    loop {
        let brightness = uleds
            .read_brightness()
            .await
            .with_context(|| format!("Failed to read from {}", args.device.display()))?;
        print_brightness(brightness);
    }
}

/// Feed brightness values typed on stdin into the in-process LED class.
///
/// Closes the session once stdin runs dry.
async fn feed_stdin(
    registry: Arc<LedClassRegistry>,
    session: Arc<DeviceSession<LedClassRegistry>>,
) {
    let name = session.name();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Brightness>() {
            Ok(value) => {
                if let Err(e) = registry.set_brightness(&name, value) {
                    error!("{e}");
                }
            }
            Err(e) => warn!("ignoring {line:?}: {e}"),
        }
    }
    info!("stdin closed");
    session.close();
}

/// Monitor a LED backed by an in-process session
async fn monitor_loopback(args: &cli::Args) -> Result<()> {
    let registry = Arc::new(LedClassRegistry::new());
    let session = Arc::new(DeviceSession::open(registry.clone()));

    let dev = UserDev::new(&args.name, args.max_brightness);
    match args.setup {
        cli::Setup::Write => session.write(&dev.to_bytes()[..]).map(drop),
        cli::Setup::Ioctl => session.setup(&dev),
    }
    .context("Failed to set up LED")?;

    if let Some(ref trigger) = args.trigger {
        session
            .set_default_trigger(&UserTrigger::new(trigger))
            .context("Failed to set default trigger")?;
    }
    info!("monitoring {} (loopback)", session.name());

    let feeder = tokio::spawn(feed_stdin(registry, session.clone()));

    let mut buf = [0u8; BRIGHTNESS_SIZE];
    let res = loop {
        match session
            .read_interruptible(&mut buf, ReadMode::Blocking, tokio::signal::ctrl_c())
            .await
        {
            Ok(_) => print_brightness(Brightness::from_ne_bytes(buf)),
            Err(UledsError::Interrupted) => {
                info!("interrupted");
                break Ok(());
            }
            // stdin is done and the session was closed under us
            Err(UledsError::NotReady) => break Ok(()),
            Err(e) => break Err(e).context("Failed to read from session"),
        }
    };
    feeder.abort();
    session.close();
    res
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    env_logger::init();

    if args.loopback {
        return monitor_loopback(&args).await;
    }

    tokio::select! {
        e = monitor_device(&args) => {
            e?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("got SIGINT, closing");
        }
    }

    Ok(())
}
