//! Flat-file exports: plain-text tables and an HDF5 container with the three
//! named arrays (`Time`, `Freq`, `Data`).

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use itertools::izip;
use log::debug;

use crate::{CallistoError, Observation};

impl Observation {
    /// Write two text tables: `<stem>_1D.txt` holds the frequency vector
    /// (NaN-padded to the time vector's length) and the time vector as two
    /// columns; `<stem>_2D.txt` holds the raw intensity matrix. Explicit
    /// paths override the derived defaults.
    pub fn export_text(
        &self,
        axes_out: Option<&Path>,
        data_out: Option<&Path>,
    ) -> Result<(PathBuf, PathBuf), CallistoError> {
        let axes_path = axes_out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_with(&self.path, "_1D.txt"));
        let data_path = data_out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_with(&self.path, "_2D.txt"));

        let mut axes = BufWriter::new(File::create(&axes_path)?);
        let padding = self.time.len().saturating_sub(self.freq.len());
        let padded_freq = self
            .freq
            .iter()
            .copied()
            .chain(std::iter::repeat(f64::NAN).take(padding));
        for (f, t) in izip!(padded_freq, self.time.iter()) {
            writeln!(axes, "{} {}", format_scientific(f), format_scientific(*t))?;
        }
        axes.flush()?;

        let mut data = BufWriter::new(File::create(&data_path)?);
        for row in self.data.outer_iter() {
            let mut first = true;
            for &v in row {
                if !first {
                    write!(data, " ")?;
                }
                write!(data, "{}", format_scientific(f64::from(v)))?;
                first = false;
            }
            writeln!(data)?;
        }
        data.flush()?;

        debug!(
            "Exported {} to {} and {}",
            self.path.display(),
            axes_path.display(),
            data_path.display()
        );
        Ok((axes_path, data_path))
    }

    /// Write `time`, `freq` and `data` as the named datasets `Time`, `Freq`
    /// and `Data` of one HDF5 file (default `<stem>.hdf5`).
    pub fn export_hdf5(&self, out: Option<&Path>) -> Result<PathBuf, CallistoError> {
        let path = out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.path.with_extension("hdf5"));

        let file = hdf5::File::create(&path)?;
        file.new_dataset_builder()
            .with_data(&self.time)
            .create("Time")?;
        file.new_dataset_builder()
            .with_data(&self.freq)
            .create("Freq")?;
        file.new_dataset_builder()
            .with_data(&self.data)
            .create("Data")?;

        debug!("Exported {} to {}", self.path.display(), path.display());
        Ok(path)
    }
}

/// `%.18e` with a signed, at-least-two-digit exponent
/// (`2.500000000000000000e-01`). Rust's `{:.18e}` alone renders the exponent
/// bare (`e-1`), which common text-table tooling does not emit.
fn format_scientific(v: f64) -> String {
    let raw = format!("{v:.18e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        // NaN and the infinities carry no exponent.
        None => raw,
    }
}

/// `/some/dir/obs.fit` + `_1D.txt` -> `/some/dir/obs_1D.txt`.
fn sibling_with(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("observation");
    path.with_file_name(format!("{stem}{suffix}"))
}
