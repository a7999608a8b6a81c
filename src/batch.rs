//! Batch driver: discover observation files in a directory and fan the
//! quicklook pipeline across a fixed-size worker pool, with shared progress
//! counters polled by the calling thread.

use std::{
    path::{Path, PathBuf},
    thread::scope,
    time::Duration,
};

use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};

use crate::{
    plot::{self, Colormap, PlotOptions},
    stats, CallistoError, Observation, OBSERVATION_EXTENSION,
};

pub const DEFAULT_WORKERS: usize = 3;

/// Progress reporting is poll-based; workers never wake the reporter, so
/// update latency is bounded by this interval.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct BatchSummary {
    pub total: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// All observation files directly inside `dir` (no recursion), sorted.
pub fn discover_observations(dir: &Path) -> Result<Vec<PathBuf>, CallistoError> {
    let mut files = vec![];
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(OBSERVATION_EXTENSION)
        {
            files.push(path);
        }
    }
    files.sort_unstable();
    Ok(files)
}

/// Process every observation file in `dir`: a raw heatmap-with-flux image and
/// a median-relative heatmap per file. Per-file failures are logged and
/// counted but never abort sibling work; a failed file still advances the
/// progress counter.
pub fn run_batch(
    dir: &Path,
    prefix: &str,
    workers: usize,
    no_progress: bool,
) -> Result<BatchSummary, CallistoError> {
    info!(
        "Searching {} for .{OBSERVATION_EXTENSION} files",
        dir.display()
    );
    let files = discover_observations(dir)?;
    let total = files.len();
    info!("Found {total} observation files");
    if total == 0 {
        return Ok(BatchSummary { total: 0, failed: 0 });
    }

    let workers = workers.max(1);
    let done = AtomicCell::new(0_usize);
    let failed = AtomicCell::new(0_usize);

    let progress = ProgressBar::with_draw_target(
        Some(total as u64),
        if no_progress {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:10}: [{wide_bar:.blue}] {pos}/{len} files ({percent}%)")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_message("Processing");
    progress.tick();

    debug!("Dispatching over {workers} workers");
    let (tx, rx) = bounded::<PathBuf>(workers);
    scope(|s| {
        // Lazily feed file names; one file per task, first-come dispatch.
        s.spawn(move || {
            for file in files {
                if tx.send(file).is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let rx = rx.clone();
            let done = &done;
            let failed = &failed;
            s.spawn(move || {
                for path in rx.iter() {
                    if let Err(e) = process_observation(&path, prefix) {
                        warn!("{}: {e}", path.display());
                        failed.fetch_add(1);
                    }
                    done.fetch_add(1);
                }
            });
        }
        drop(rx);

        // The reporter only ever sleeps and reads the counter; it redraws
        // when the count changed since the last poll.
        let mut last_seen = 0;
        while done.load() < total {
            std::thread::sleep(POLL_INTERVAL);
            let now = done.load();
            if now != last_seen {
                progress.set_position(now as u64);
                last_seen = now;
            }
        }
    });
    progress.set_position(total as u64);
    progress.finish();

    let summary = BatchSummary {
        total,
        failed: failed.load(),
    };
    if summary.failed > 0 {
        warn!("{} of {} files failed", summary.failed, summary.total);
    }
    Ok(summary)
}

/// One worker task: decode, render the raw composite, then render the
/// median-relative heatmap.
fn process_observation(path: &Path, prefix: &str) -> Result<(), CallistoError> {
    debug!("Processing {}", path.display());
    let obs = Observation::from_file(path)?;

    let raw = obs.data.mapv(f32::from);
    let raw_opts = PlotOptions {
        prefix: prefix.to_string(),
        colormap: Colormap::Inferno,
        intensity_range: Some((100.0, 200.0)),
        ..Default::default()
    };
    plot::render_heatmap_with_flux(&obs, raw.view(), &raw_opts)?;

    let normalised = stats::median_relative(obs.data.view());
    let med_opts = PlotOptions {
        prefix: prefix.to_string(),
        suffix: "MED".to_string(),
        ..Default::default()
    };
    plot::render_heatmap(&obs, normalised.view(), &med_opts)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use ndarray::Array2;

    use super::*;

    #[test]
    fn discovery_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fit", "a.fit", "notes.txt", "c.fits"] {
            File::create(dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.fit")).unwrap();

        let files = discover_observations(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.fit", "b.fit"]);
    }

    #[test]
    fn discovery_of_missing_directory_is_an_error() {
        assert!(discover_observations(Path::new("/no/such/dir")).is_err());
    }

    #[test]
    fn empty_directory_yields_an_empty_successful_summary() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run_batch(dir.path(), "", DEFAULT_WORKERS, true).unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.all_succeeded());
    }

    #[test]
    fn corrupt_files_are_counted_but_do_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one.fit", "two.fit", "three.fit"] {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(b"definitely not a FITS file\n").unwrap();
        }

        let summary = run_batch(dir.path(), "TEST", 2, true).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 3);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn mixed_batch_isolates_the_failure_and_writes_both_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.fit");
        let time: Vec<f64> = (0..60).map(f64::from).collect();
        let freq: Vec<f64> = (0..20).map(|i| 90.0 - f64::from(i)).collect();
        let data = Array2::from_shape_fn((20, 60), |(f, t)| ((f * 3 + t) % 256) as u8);
        crate::read::write_synthetic_fits(&good, &time, &freq, &data).unwrap();
        File::create(dir.path().join("bad.fit"))
            .unwrap()
            .write_all(b"not a FITS file\n")
            .unwrap();

        let summary = run_batch(dir.path(), "MIX", 2, true).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());

        // The surviving file's raw composite and median-relative images land
        // beside it, named from its header timestamp.
        assert!(dir.path().join("MIX_20150423_083012.png").exists());
        assert!(dir.path().join("MIX_20150423_083012_MED.png").exists());
    }
}
