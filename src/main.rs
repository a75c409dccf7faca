//! # Proximity Cam Entry Point
//!
//! Wires the pipeline together: configuration, sensor lines, the monitor loop
//! on its own OS thread, and the status endpoint on a tokio runtime.
//!
//! The monitor runs on a plain thread because pulse timing busy-waits; an async
//! worker would either starve other tasks or get preempted mid-measurement.


use anyhow::{anyhow, Context};
use proximity_cam_lib::{
    camera::CommandImageProvider,
    config::{Config, StatusConfig, DEFAULT_CONFIG_PATH},
    detector::ThresholdDetector,
    distance::DistanceSampler,
    monitor::{MonitorLoop, MonitorStats, StopSignal},
    pulse::{EchoLine, PulseTimer, SystemClock, TriggerLine},
    status,
    upload::HttpUploadClient,
};
use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

/// Command line options
struct Args {
    config_path: PathBuf,
    /// Write the effective configuration to `config_path` and exit
    write_config: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        write_config: false,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a path"))?;
                args.config_path = PathBuf::from(path);
            }
            "--write-config" => args.write_config = true,
            other => return Err(anyhow!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

/// Monitor loop running on its own OS thread.
struct MonitorThread {
    handle: JoinHandle<anyhow::Result<MonitorStats>>,
    /// Resolves when the thread has finished, for whatever reason
    finished: oneshot::Receiver<()>,
}

/// Run `work` on a dedicated "monitor" thread.
#[cfg_attr(
    not(any(test, all(target_os = "linux", feature = "hardware"))),
    allow(dead_code)
)]
fn spawn_monitor_thread<F>(work: F) -> anyhow::Result<MonitorThread>
where
    F: FnOnce() -> anyhow::Result<MonitorStats> + Send + 'static,
{
    let (done, finished) = oneshot::channel();
    let handle = thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let result = work();
            let _ = done.send(());
            result
        })
        .context("failed to spawn monitor thread")?;
    Ok(MonitorThread { handle, finished })
}

/// Build the pipeline around already-claimed sensor lines and start it.
#[cfg_attr(
    not(all(target_os = "linux", feature = "hardware")),
    allow(dead_code)
)]
fn spawn_monitor<T, E>(
    config: Arc<Config>,
    trigger: T,
    echo: E,
    uploader: HttpUploadClient,
    stop: StopSignal,
) -> anyhow::Result<MonitorThread>
where
    T: TriggerLine + Send + 'static,
    E: EchoLine + Send + 'static,
{
    spawn_monitor_thread(move || {
        let timer = PulseTimer::from_config(trigger, echo, SystemClock, &config.sensor);
        let mut monitor = MonitorLoop::new(
            DistanceSampler::new(timer),
            ThresholdDetector::new(config.monitor.threshold_cm),
            CommandImageProvider::from_config(&config.camera),
            uploader,
            config.monitor.interval(),
        );
        Ok(monitor.run(&stop))
    })
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn start_pipeline(config: Arc<Config>, stop: StopSignal) -> anyhow::Result<MonitorThread> {
    let sensor = &config.sensor;
    log::info!(
        "Ultrasonic sensor: trigger GPIO {}, echo GPIO {}, echo timeout {:?}",
        sensor.trigger_pin,
        sensor.echo_pin,
        sensor.echo_timeout()
    );

    // Fatal: without the sensor there is nothing to monitor
    let (trigger, echo) = proximity_cam_lib::hardware::open_lines(sensor)
        .context("failed to initialize ultrasonic sensor")?;

    // blocking client: built here, before any tokio runtime exists
    let uploader =
        HttpUploadClient::new(&config.upload).context("failed to build HTTP client")?;
    log::info!("Uploading captures to {}", uploader.endpoint());

    spawn_monitor(config, trigger, echo, uploader, stop)
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn start_pipeline(_config: Arc<Config>, _stop: StopSignal) -> anyhow::Result<MonitorThread> {
    log::error!("Ultrasonic sensor support requires Linux and the `hardware` feature");
    Err(proximity_cam_lib::hardware::HardwareError::Unsupported.into())
}

/// Serve the status endpoint until `shutdown` resolves or the monitor exits.
///
/// The monitor is expected to run until stopped; if it finishes on its own the
/// process fails with its error instead of lingering without a monitor.
fn run_until_shutdown<F>(
    monitor: MonitorThread,
    stop: &StopSignal,
    status_config: Option<StatusConfig>,
    shutdown: F,
) -> anyhow::Result<MonitorStats>
where
    F: Future<Output = ()>,
{
    let MonitorThread { handle, finished } = monitor;

    // Create Tokio runtime for the status endpoint and signal handling
    let rt = tokio::runtime::Runtime::new()?;
    let requested = rt.block_on(async {
        if let Some(config) = status_config {
            let token = stop.token();
            tokio::spawn(async move {
                // the monitor keeps running without its status page
                if let Err(e) = status::serve(&config, token).await {
                    log::error!("Status endpoint failed: {}", e);
                }
            });
        }

        tokio::select! {
            _ = shutdown => {
                log::info!("Shutdown requested, finishing current cycle...");
                true
            }
            _ = finished => false,
        }
    });
    stop.stop();
    drop(rt);

    let result = handle
        .join()
        .map_err(|_| anyhow!("monitor thread panicked"))?;
    if requested {
        return result;
    }
    match result {
        Ok(_) => Err(anyhow!("monitor loop exited without a shutdown request")),
        Err(e) => Err(e.context("monitor loop failed")),
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix (systemd stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = Config::load_from_path(&args.config_path);

    if args.write_config {
        config.save_to_path(&args.config_path)?;
        return Ok(());
    }

    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);
    log::info!(
        "Threshold {:.1} cm, sampling every {:?}",
        config.monitor.threshold_cm,
        config.monitor.interval()
    );

    let stop = StopSignal::new();
    let monitor = start_pipeline(Arc::clone(&config), stop.clone())?;

    let status_config = config.status.enabled.then(|| config.status.clone());
    let stats = run_until_shutdown(monitor, &stop, status_config, shutdown_signal())?;
    log::info!(
        "Final stats: {} cycles, {} readings, {} detections, {} uploads",
        stats.cycles,
        stats.readings,
        stats.detections,
        stats.uploads
    );
    Ok(())
}
