use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use eframe::egui;

use rusty_ifit::analysis::linear::LinearAnalyser;
use rusty_ifit::app::FitMonitorApp;
use rusty_ifit::config::RunConfig;
use rusty_ifit::data::loader::FileLoader;
use rusty_ifit::data::model::SpectrumFormat;
use rusty_ifit::live::{ChannelSink, LiveView};
use rusty_ifit::{BatchDriver, CancelFlag, RunReport};

#[derive(Parser, Debug)]
#[command(name = "rusty-ifit", version)]
#[command(about = "Batch DOAS fitting of a directory of spectra")]
struct Args {
    /// JSON run file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the dark and measurement spectra
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Results CSV (overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Spectrum file format (ifit or json)
    #[arg(long)]
    format: Option<SpectrumFormat>,

    /// Open the live fit monitor
    #[arg(long, conflicts_with = "no_plot")]
    plot: bool,

    /// Run without the live fit monitor
    #[arg(long)]
    no_plot: bool,

    /// Print an example run file and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&RunConfig::example())?);
        return Ok(());
    }

    let Some(path) = &args.config else {
        bail!("no run file given (use --config, or --dump-config for an example)");
    };
    let mut config = RunConfig::load(path)?;
    if let Some(dir) = args.input_dir {
        config.input_dir = dir;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if args.plot {
        config.plot.enabled = true;
    }
    if args.no_plot {
        config.plot.enabled = false;
    }

    // ---- Setup: every failure here is fatal ----
    let params = config.parameters()?;
    config.validate_plot(&params)?;
    println!("{}", params.render());

    let (dark, measurements) = config.inputs()?;
    log::info!(
        "Found {} spectra and {} dark files in {}",
        measurements.len(),
        dark.len(),
        config.input_dir.display()
    );

    let analyser = LinearAnalyser::new(&params, config.fit_window, config.frs_path.as_deref())?;
    let cancel = CancelFlag::new();
    let driver = BatchDriver::new(
        analyser,
        FileLoader::new(config.format),
        params,
        config.fit_options(),
    )?
    .with_cancel(cancel.clone());

    // ---- Run ----
    let report = if config.plot.enabled {
        run_with_monitor(driver, &config, dark, measurements, cancel)?
    } else {
        let mut driver = driver;
        driver.run(&dark, &measurements, &config.output)?
    };

    log::info!(
        "Done! {} rows ({} unread, {} failed, {} degraded{}) saved to {}",
        report.table.len(),
        report.unread,
        report.failed,
        report.degraded,
        if report.cancelled { ", cancelled" } else { "" },
        report.output.display()
    );
    Ok(())
}

/// Run the batch on a worker thread while the monitor window owns the main
/// thread. Returns once the batch is done and the window has been closed.
fn run_with_monitor(
    driver: BatchDriver<LinearAnalyser, FileLoader>,
    config: &RunConfig,
    dark: Vec<PathBuf>,
    measurements: Vec<PathBuf>,
    cancel: CancelFlag,
) -> Result<RunReport> {
    let (tx, rx) = mpsc::channel();
    let species = config.plot_species().unwrap_or_default();
    let series = config.plot_series().unwrap_or_default();
    let mut driver = driver.with_view(LiveView::new(Box::new(ChannelSink(tx)), &species, &series));

    let output = config.output.clone();
    let worker = thread::spawn(move || driver.run(&dark, &measurements, &output));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 640.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };
    let shown = eframe::run_native(
        "Rusty iFit – Fit Monitor",
        options,
        Box::new(move |_cc| Ok(Box::new(FitMonitorApp::new(rx, cancel)))),
    );
    if let Err(e) = shown {
        log::warn!("Live view unavailable ({e}); continuing without it");
    }

    let report = worker
        .join()
        .map_err(|_| anyhow!("analysis thread panicked"))??;
    Ok(report)
}
