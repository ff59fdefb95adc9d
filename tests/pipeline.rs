use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;

use rusty_ifit::analysis::linear::LinearAnalyser;
use rusty_ifit::data::loader::{FileLoader, SpectrumLoader};
use rusty_ifit::data::model::{ReferenceSpectrum, Spectrum, SpectrumFormat};
use rusty_ifit::error::{AnalysisError, SpectrumReadError, VisualizationError};
use rusty_ifit::live::{LiveView, ViewEvent, ViewPhase, ViewSink};
use rusty_ifit::results::FIT_FAILED;
use rusty_ifit::{
    Analyser, BatchDriver, CancelFlag, FitOptions, FitResult, InterpMethod, Parameters,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Spectra served from memory; paths without an entry fail to parse.
#[derive(Default)]
struct MemoryLoader {
    spectra: HashMap<PathBuf, Spectrum>,
}

impl MemoryLoader {
    fn with(mut self, name: &str, time: &str) -> Self {
        let spectrum = Spectrum::new(vec![300.0, 301.0], vec![1000.0, 1010.0], time);
        self.spectra.insert(PathBuf::from(name), spectrum);
        self
    }
}

impl SpectrumLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Spectrum, SpectrumReadError> {
        self.spectra
            .get(path)
            .cloned()
            .ok_or_else(|| SpectrumReadError::Parse {
                path: path.to_path_buf(),
                line: 1,
                reason: "not a spectrum".to_string(),
            })
    }
}

/// Returns every seed plus one and remembers the seeds it was given.
#[derive(Default)]
struct StepAnalyser {
    seeds: Arc<Mutex<Vec<BTreeMap<String, f64>>>>,
    /// Spectrum times for which the fit is flagged degraded.
    degrade: Vec<String>,
    /// Spectrum times for which no fit is produced.
    reject: Vec<String>,
    /// Cancel this flag once the given number of fits has run.
    cancel_after: Option<(usize, CancelFlag)>,
}

impl Analyser for StepAnalyser {
    fn set_dark(&mut self, _dark: Vec<f64>) {}

    fn fit(
        &mut self,
        spectrum: &Spectrum,
        params: &Parameters,
        _options: &FitOptions,
    ) -> Result<FitResult, AnalysisError> {
        let seeds: BTreeMap<String, f64> =
            params.iter().map(|p| (p.name.clone(), p.value)).collect();
        let calls = {
            let mut all = self.seeds.lock().unwrap();
            all.push(seeds.clone());
            all.len()
        };
        if let Some((n, flag)) = &self.cancel_after {
            if calls >= *n {
                flag.cancel();
            }
        }
        if self.reject.contains(&spectrum.time) {
            return Err(AnalysisError::EmptyWindow { lo: 0.0, hi: 1.0 });
        }

        let fit_values: BTreeMap<String, f64> =
            seeds.iter().map(|(k, v)| (k.clone(), v + 1.0)).collect();
        let fit_errors = seeds.keys().map(|k| (k.clone(), 0.25)).collect();
        Ok(FitResult {
            grid: spectrum.x.clone(),
            spec: spectrum.y.clone(),
            fit: spectrum.y.clone(),
            resid: vec![0.0; spectrum.len()],
            fit_values,
            fit_errors,
            nerr: u32::from(self.degrade.contains(&spectrum.time)),
            int_lo: 1000.0,
            int_hi: 1010.0,
            int_av: 1005.0,
            time: spectrum.time.clone(),
            ..Default::default()
        })
    }
}

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<ViewEvent>>>);

impl ViewSink for RecordingSink {
    fn send(&mut self, event: ViewEvent) -> Result<(), VisualizationError> {
        self.0.lock().unwrap().push(event);
        Ok(())
    }
}

/// Accepts the first event, then reports the window as gone.
struct ClosedAfterFirst(usize);

impl ViewSink for ClosedAfterFirst {
    fn send(&mut self, _event: ViewEvent) -> Result<(), VisualizationError> {
        self.0 += 1;
        if self.0 > 1 {
            Err(VisualizationError::Disconnected)
        } else {
            Ok(())
        }
    }
}

fn registry() -> Parameters {
    let mut params = Parameters::new();
    params.add("SO2", 1.0e16, true, Some(Path::new("so2.txt"))).unwrap();
    params.add("bg0", 0.0, true, None).unwrap();
    params
}

fn three_files() -> (MemoryLoader, Vec<PathBuf>) {
    let loader = MemoryLoader::default()
        .with("spectrum_00000.txt", "12:00:00")
        .with("spectrum_00002.txt", "12:00:02");
    let files = vec![
        PathBuf::from("spectrum_00002.txt"),
        PathBuf::from("spectrum_00001.txt"),
        PathBuf::from("spectrum_00000.txt"),
    ];
    (loader, files)
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Batch behaviour
// ---------------------------------------------------------------------------

#[test]
fn one_row_per_spectrum_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let (loader, files) = three_files();

    let mut driver =
        BatchDriver::new(StepAnalyser::default(), loader, registry(), FitOptions::default())
            .unwrap();
    let report = driver.run(&[], &files, &output).unwrap();

    assert_eq!(report.table.len(), 3);
    assert_eq!(report.unread, 1);
    assert_eq!(report.failed, 0);
    assert!(!report.cancelled);

    let indices: Vec<usize> = report.table.rows().iter().map(|r| r.index).collect();
    assert_eq!(indices, [0, 1, 2]);
    let times: Vec<Option<&str>> = report
        .table
        .rows()
        .iter()
        .map(|r| r.time.as_deref())
        .collect();
    assert_eq!(times, [Some("12:00:00"), None, Some("12:00:02")]);

    let rows = lines(&output);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], "Number,Time,SO2,SO2_err,bg0,bg0_err,fit_quality,int_lo,int_hi,int_av");
    assert_eq!(rows[2], "1,,,,,,,,,");
    assert!(rows[1].starts_with("0,12:00:00,"));
    assert!(rows[3].starts_with("2,12:00:02,"));
}

#[test]
fn warm_start_seeds_each_fit_with_the_previous_result() {
    let dir = tempfile::tempdir().unwrap();
    let loader = MemoryLoader::default()
        .with("a.txt", "1")
        .with("b.txt", "2")
        .with("c.txt", "3");
    let files: Vec<PathBuf> = ["a.txt", "b.txt", "c.txt"].map(PathBuf::from).to_vec();
    let analyser = StepAnalyser::default();
    let seeds = Arc::clone(&analyser.seeds);

    let options = FitOptions::new(true, InterpMethod::Linear);
    let mut driver = BatchDriver::new(analyser, loader, registry(), options).unwrap();
    driver.run(&[], &files, &dir.path().join("out.csv")).unwrap();

    let bg0: Vec<f64> = seeds.lock().unwrap().iter().map(|s| s["bg0"]).collect();
    assert_eq!(bg0, [0.0, 1.0, 2.0]);
    assert_eq!(driver.params().get("bg0").unwrap().value, 3.0);
}

#[test]
fn seeds_stay_fixed_without_warm_start() {
    let dir = tempfile::tempdir().unwrap();
    let loader = MemoryLoader::default().with("a.txt", "1").with("b.txt", "2");
    let files: Vec<PathBuf> = ["a.txt", "b.txt"].map(PathBuf::from).to_vec();
    let analyser = StepAnalyser::default();
    let seeds = Arc::clone(&analyser.seeds);

    let options = FitOptions::new(false, InterpMethod::Linear);
    let mut driver = BatchDriver::new(analyser, loader, registry(), options).unwrap();
    driver.run(&[], &files, &dir.path().join("out.csv")).unwrap();

    let bg0: Vec<f64> = seeds.lock().unwrap().iter().map(|s| s["bg0"]).collect();
    assert_eq!(bg0, [0.0, 0.0]);
}

#[test]
fn degraded_fits_are_recorded_but_do_not_seed() {
    let dir = tempfile::tempdir().unwrap();
    let loader = MemoryLoader::default()
        .with("a.txt", "1")
        .with("b.txt", "2")
        .with("c.txt", "3");
    let files: Vec<PathBuf> = ["a.txt", "b.txt", "c.txt"].map(PathBuf::from).to_vec();
    let analyser = StepAnalyser {
        degrade: vec!["2".to_string()],
        ..Default::default()
    };
    let seeds = Arc::clone(&analyser.seeds);

    let options = FitOptions::new(true, InterpMethod::Linear);
    let mut driver = BatchDriver::new(analyser, loader, registry(), options).unwrap();
    let report = driver.run(&[], &files, &dir.path().join("out.csv")).unwrap();

    assert_eq!(report.degraded, 1);
    assert_eq!(report.table.rows()[1].fit_quality, Some(1));
    let bg0: Vec<f64> = seeds.lock().unwrap().iter().map(|s| s["bg0"]).collect();
    assert_eq!(bg0, [0.0, 1.0, 1.0]);
}

#[test]
fn analyser_failure_keeps_the_time_and_the_batch_going() {
    let dir = tempfile::tempdir().unwrap();
    let loader = MemoryLoader::default().with("a.txt", "1").with("b.txt", "2");
    let files: Vec<PathBuf> = ["a.txt", "b.txt"].map(PathBuf::from).to_vec();
    let analyser = StepAnalyser {
        reject: vec!["1".to_string()],
        ..Default::default()
    };

    let mut driver =
        BatchDriver::new(analyser, loader, registry(), FitOptions::default()).unwrap();
    let report = driver.run(&[], &files, &dir.path().join("out.csv")).unwrap();

    assert_eq!(report.failed, 1);
    let first = &report.table.rows()[0];
    assert_eq!(first.time.as_deref(), Some("1"));
    assert_eq!(first.fit_quality, Some(FIT_FAILED));
    assert!(!first.is_fitted());
    assert!(report.table.rows()[1].is_fitted());

    let rows = lines(&dir.path().join("out.csv"));
    assert_eq!(rows[1], "0,1,,,,,2,,,");
}

#[test]
fn output_is_identical_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let run = |name: &str| {
        let (loader, files) = three_files();
        let output = dir.path().join(name);
        let mut driver =
            BatchDriver::new(StepAnalyser::default(), loader, registry(), FitOptions::default())
                .unwrap();
        driver.run(&[], &files, &output).unwrap();
        fs::read(output).unwrap()
    };
    assert_eq!(run("first.csv"), run("second.csv"));
}

#[test]
fn live_view_does_not_change_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let options = || FitOptions::new(true, InterpMethod::Linear);

    let (loader, files) = three_files();
    let plain = dir.path().join("plain.csv");
    BatchDriver::new(StepAnalyser::default(), loader, registry(), options())
        .unwrap()
        .run(&[], &files, &plain)
        .unwrap();

    let (loader, files) = three_files();
    let viewed = dir.path().join("viewed.csv");
    let sink = RecordingSink::default();
    let events = Arc::clone(&sink.0);
    let mut driver = BatchDriver::new(StepAnalyser::default(), loader, registry(), options())
        .unwrap()
        .with_view(LiveView::new(Box::new(sink), "SO2", "SO2"));
    driver.run(&[], &files, &viewed).unwrap();

    assert_eq!(fs::read(&plain).unwrap(), fs::read(&viewed).unwrap());
    assert_eq!(driver.view().map(LiveView::phase), Some(ViewPhase::Closed));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 5);
    assert!(matches!(events[0], ViewEvent::Started { total: 3, .. }));
    assert!(matches!(&events[1], ViewEvent::Frame(f) if f.index == 0 && f.tighten));
    assert!(matches!(events[2], ViewEvent::Skipped { index: 1, .. }));
    assert!(matches!(&events[3], ViewEvent::Frame(f) if f.index == 2 && !f.tighten));
    assert!(matches!(
        events[4],
        ViewEvent::Finished { rows: 3, cancelled: false, .. }
    ));
}

#[test]
fn a_closed_window_disables_the_view_only() {
    let dir = tempfile::tempdir().unwrap();
    let (loader, files) = three_files();
    let output = dir.path().join("out.csv");
    let mut driver =
        BatchDriver::new(StepAnalyser::default(), loader, registry(), FitOptions::default())
            .unwrap()
            .with_view(LiveView::new(Box::new(ClosedAfterFirst(0)), "SO2", "SO2"));

    let report = driver.run(&[], &files, &output).unwrap();
    assert_eq!(report.table.len(), 3);
    assert_eq!(lines(&output).len(), 4);
    let view = driver.view().unwrap();
    assert!(!view.is_connected());
    assert_eq!(view.phase(), ViewPhase::Closed);
}

#[test]
fn cancelling_keeps_the_rows_already_processed() {
    let dir = tempfile::tempdir().unwrap();
    let loader = MemoryLoader::default()
        .with("a.txt", "1")
        .with("b.txt", "2")
        .with("c.txt", "3")
        .with("d.txt", "4");
    let files: Vec<PathBuf> = ["a.txt", "b.txt", "c.txt", "d.txt"].map(PathBuf::from).to_vec();
    let cancel = CancelFlag::new();
    let analyser = StepAnalyser {
        cancel_after: Some((2, cancel.clone())),
        ..Default::default()
    };
    let output = dir.path().join("out.csv");

    let mut driver = BatchDriver::new(analyser, loader, registry(), FitOptions::default())
        .unwrap()
        .with_cancel(cancel);
    let report = driver.run(&[], &files, &output).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.table.len(), 2);
    assert_eq!(lines(&output).len(), 3);
}

#[test]
fn broken_cross_section_degrades_rows_and_still_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (loader, files) = three_files();
    let xsec = ReferenceSpectrum {
        x: vec![299.0, 300.0, 300.0, 301.0, 302.0],
        y: vec![1e-19, 2e-19, 2e-19, f64::NAN, 4e-19],
    };
    let analyser = LinearAnalyser::from_references(
        [299.5, 301.5],
        None,
        BTreeMap::from([("SO2".to_string(), xsec)]),
    )
    .unwrap();
    let output = dir.path().join("out.csv");

    let options = FitOptions::new(true, InterpMethod::Cubic);
    let mut driver = BatchDriver::new(analyser, loader, registry(), options).unwrap();
    let report = driver.run(&[], &files, &output).unwrap();

    assert_eq!(report.table.len(), 3);
    assert_eq!(report.degraded, 2);
    assert_eq!(lines(&output).len(), 4);
    assert_eq!(driver.params().get("SO2").unwrap().value, 1.0e16);
}

#[test]
fn unknown_calc_od_species_fails_before_the_run() {
    let options = FitOptions::default().with_calc_od(["bg0"]);
    let (loader, _) = three_files();
    assert!(BatchDriver::new(StepAnalyser::default(), loader, registry(), options).is_err());
}

// ---------------------------------------------------------------------------
// End to end with files on disk
// ---------------------------------------------------------------------------

fn sigma(x: f64) -> f64 {
    1.0e-19 * (1.5 + (x * 1.7).sin())
}

fn write_columns(path: &Path, header: &str, x: &[f64], y: &[f64]) {
    let mut text = header.to_string();
    for (a, b) in x.iter().zip(y) {
        text.push_str(&format!("{a} {b:e}\n"));
    }
    fs::write(path, text).unwrap();
}

#[test]
fn fits_synthetic_spectra_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();

    let axis: Vec<f64> = (0..=200).map(|i| 305.0 + i as f64 * 0.1).collect();
    let xsec_path = dir.path().join("SO2.txt");
    let xsec: Vec<f64> = axis.iter().map(|&x| sigma(x)).collect();
    write_columns(&xsec_path, "# SO2\n", &axis, &xsec);

    let dark = vec![50.0; axis.len()];
    write_columns(&data.join("dark_0.txt"), "# Time: 11:59:00\n", &axis, &dark);
    let amounts: [f64; 2] = [1.0e16, 4.0e16];
    for (i, amount) in amounts.iter().enumerate() {
        let y: Vec<f64> = axis
            .iter()
            .map(|&x| 50.0 + 8000.0 * (-amount * sigma(x)).exp())
            .collect();
        let header = format!("# Date: 2024-03-01\n# Time: 12:00:0{i}\n");
        write_columns(&data.join(format!("spectrum_{i:05}.txt")), &header, &axis, &y);
    }
    fs::write(data.join("spectrum_00002.txt"), "# Time: 12:00:02\nbroken line\n").unwrap();

    let mut params = Parameters::new();
    params.add("SO2", 1.0e15, true, Some(&xsec_path)).unwrap();
    params.add("bg_poly0", 0.0, true, None).unwrap();

    let analyser = LinearAnalyser::new(&params, [306.0, 324.0], None).unwrap();
    let options = FitOptions::new(true, InterpMethod::Cubic).with_calc_od(["SO2"]);
    let mut driver = BatchDriver::new(
        analyser,
        FileLoader::new(SpectrumFormat::IFit),
        params,
        options,
    )
    .unwrap();

    let dark_files = vec![data.join("dark_0.txt")];
    let measurements = rusty_ifit::data::loader::discover(&data, "spectrum_").unwrap();
    let output = dir.path().join("iFit_output.csv");
    let report = driver.run(&dark_files, &measurements, &output).unwrap();

    assert_eq!(report.table.len(), 3);
    assert_eq!(report.unread, 1);
    assert_eq!(report.degraded, 0);

    let so2 = report.table.series("SO2");
    assert_eq!(so2.len(), 2);
    assert_relative_eq!(so2[0][1], amounts[0], max_relative = 1e-6);
    assert_relative_eq!(so2[1][1], amounts[1], max_relative = 1e-6);

    let rows = lines(&output);
    assert_eq!(rows.len(), 4);
    assert!(rows[1].starts_with("0,2024-03-01 12:00:00,"));
    assert_eq!(rows[3], "2,,,,,,,,,");
}
