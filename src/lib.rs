//! Quicklook processing for e-Callisto radio spectrograms.

pub mod batch;
pub mod plot;
pub mod read;
pub mod stats;
pub mod write;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use ndarray::{s, Array1, Array2};
use thiserror::Error;

use crate::read::fits::FitsError;

/// The instrument's last 7 frequency channels are unreliable and are always
/// dropped after decoding. Not configurable.
pub const TRAILING_BAD_CHANNELS: usize = 7;

/// File extension of raw e-Callisto observation files.
pub const OBSERVATION_EXTENSION: &str = "fit";

#[derive(Error, Debug)]
pub enum CallistoError {
    #[error("couldn't decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: FitsError,
    },

    #[error("{path}: header has no {key} key")]
    MissingHeaderKey { path: PathBuf, key: &'static str },

    #[error("{path}: expected more than {TRAILING_BAD_CHANNELS} frequency channels, found {found}")]
    TooFewChannels { path: PathBuf, found: usize },

    #[error("{path}: {freqs} frequency values against {rows} data rows")]
    ShapeMismatch {
        path: PathBuf,
        freqs: usize,
        rows: usize,
    },

    #[error("couldn't parse {field} value {value:?}")]
    Parse { field: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hdf5(#[from] hdf5::Error),

    #[error("rendering failed: {0}")]
    Render(String),
}

/// One decoded observation: a time × frequency intensity matrix plus the
/// metadata needed to label it.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// The path this observation was (or will be) decoded from.
    pub path: PathBuf,

    /// Seconds offsets from the observation start, length T.
    pub time: Array1<f64>,

    /// Channel frequencies \[MHz\], descending, length F. After the trailing
    /// correction F is the raw channel count minus [`TRAILING_BAD_CHANNELS`],
    /// and is generally smaller than T.
    pub freq: Array1<f64>,

    /// F×T matrix of raw instrument intensities.
    ///
    /// Callers may overwrite this with a derived matrix; the batch driver
    /// instead passes derived matrices to the renderer explicitly.
    pub data: Array2<u8>,

    /// String-keyed FITS header records. Contains at least `DATE-OBS` and
    /// `TIME-OBS` for any file the instrument wrote.
    pub header: HashMap<String, String>,

    /// Hex SHA-256 of the file's *first raw line* only. A cheap identity
    /// test, not a content hash; see [`Observation::same_checksum`].
    pub checksum: Option<String>,

    /// mean(data) / std(data). NaN when the matrix is constant.
    pub snr: f64,
}

impl Observation {
    /// Decode an observation file: primary image, TIME/FREQUENCY vectors and
    /// header from the binary-table extension, then the trailing-channel
    /// correction, SNR and first-line checksum.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Observation, CallistoError> {
        let path = path.as_ref();
        let decoded = read::decode_observation(path)?;
        let checksum = read::first_line_checksum(path)?;
        Observation::from_parts(
            path.to_path_buf(),
            decoded.time,
            decoded.freq,
            decoded.data,
            decoded.header,
            Some(checksum),
        )
    }

    /// Build an observation from already-decoded arrays. The trailing-channel
    /// correction and SNR are applied here, so synthetic inputs behave
    /// exactly like decoded files.
    pub fn from_parts(
        path: PathBuf,
        time: Array1<f64>,
        freq: Array1<f64>,
        data: Array2<u8>,
        header: HashMap<String, String>,
        checksum: Option<String>,
    ) -> Result<Observation, CallistoError> {
        if freq.len() != data.nrows() {
            return Err(CallistoError::ShapeMismatch {
                path,
                freqs: freq.len(),
                rows: data.nrows(),
            });
        }
        if freq.len() <= TRAILING_BAD_CHANNELS {
            return Err(CallistoError::TooFewChannels {
                path,
                found: freq.len(),
            });
        }

        let keep = freq.len() - TRAILING_BAD_CHANNELS;
        let freq = freq.slice(s![..keep]).to_owned();
        let data = data.slice(s![..keep, ..]).to_owned();
        let snr = signal_to_noise(&data);

        Ok(Observation {
            path,
            time,
            freq,
            data,
            header,
            checksum,
            snr,
        })
    }

    /// Rebind the path and recompute the checksum *only*. The arrays are left
    /// untouched; call [`Observation::load_data`] to decode the new file.
    /// This split lets batch code deduplicate files by identity before paying
    /// for a full decode.
    pub fn set_path<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CallistoError> {
        self.path = path.as_ref().to_path_buf();
        self.checksum = Some(read::first_line_checksum(&self.path)?);
        Ok(())
    }

    /// (Re)decode the currently bound path, replacing the arrays, header and
    /// SNR.
    pub fn load_data(&mut self) -> Result<(), CallistoError> {
        let decoded = read::decode_observation(&self.path)?;
        let loaded = Observation::from_parts(
            self.path.clone(),
            decoded.time,
            decoded.freq,
            decoded.data,
            decoded.header,
            self.checksum.clone(),
        )?;
        *self = loaded;
        Ok(())
    }

    /// Weak equality: true iff the first-line checksums match. Two
    /// structurally different files sharing a first line compare equal; this
    /// is a known limitation of the identity test, kept deliberately cheap.
    pub fn same_checksum(&self, other: &Observation) -> bool {
        self.checksum == other.checksum
    }

    pub fn header(&self) -> &HashMap<String, String> {
        &self.header
    }

    /// The `DATE-OBS` header value (day/month/year, slash-separated).
    pub fn observation_date(&self) -> Result<&str, CallistoError> {
        self.header_value("DATE-OBS")
    }

    /// The `TIME-OBS` header value (`HH:MM:SS` with fractional seconds).
    pub fn observation_start_time(&self) -> Result<&str, CallistoError> {
        self.header_value("TIME-OBS")
    }

    fn header_value(&self, key: &'static str) -> Result<&str, CallistoError> {
        self.header
            .get(key)
            .map(String::as_str)
            .ok_or(CallistoError::MissingHeaderKey {
                path: self.path.clone(),
                key,
            })
    }
}

/// mean/std of the full matrix. The population standard deviation is used; a
/// constant matrix yields NaN rather than a division by zero.
fn signal_to_noise(data: &Array2<u8>) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let n = data.len() as f64;
    let mean = data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = data
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = var.sqrt();
    if std == 0.0 {
        f64::NAN
    } else {
        mean / std
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    use super::*;

    fn synthetic(num_chans: usize, num_samples: usize) -> Observation {
        let time = Array1::from_iter((0..num_samples).map(|i| i as f64));
        let freq = Array1::from_iter((0..num_chans).map(|i| 100.0 - i as f64));
        let data = Array2::from_shape_fn((num_chans, num_samples), |(f, t)| {
            ((f * 13 + t * 7) % 251) as u8
        });
        Observation::from_parts(
            PathBuf::from("synthetic.fit"),
            time,
            freq,
            data,
            HashMap::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn trailing_correction_removes_seven_channels() {
        let obs = synthetic(200, 3600);
        assert_eq!(obs.freq.len(), 193);
        assert_eq!(obs.data.nrows(), 193);
        assert_eq!(obs.time.len(), 3600);
    }

    #[test]
    fn eight_channels_collapse_to_one() {
        // The smallest viable observation: 8 channels in, 1 out.
        let obs = synthetic(8, 100);
        assert_eq!(obs.freq.len(), 1);
        assert_eq!(obs.data.nrows(), 1);
    }

    #[test]
    fn too_few_channels_is_an_error() {
        let time = Array1::zeros(10);
        let freq = Array1::zeros(7);
        let data = Array2::zeros((7, 10));
        let res = Observation::from_parts(
            PathBuf::from("short.fit"),
            time,
            freq,
            data,
            HashMap::new(),
            None,
        );
        assert!(matches!(res, Err(CallistoError::TooFewChannels { .. })));
    }

    #[test]
    fn freq_data_shape_mismatch_is_an_error() {
        let time = Array1::zeros(10);
        let freq = Array1::zeros(20);
        let data = Array2::zeros((21, 10));
        let res = Observation::from_parts(
            PathBuf::from("bad.fit"),
            time,
            freq,
            data,
            HashMap::new(),
            None,
        );
        assert!(matches!(res, Err(CallistoError::ShapeMismatch { .. })));
    }

    #[test]
    fn snr_of_constant_matrix_is_nan() {
        let data = Array2::from_elem((10, 10), 42_u8);
        assert!(signal_to_noise(&data).is_nan());
    }

    #[test]
    fn snr_matches_direct_computation() {
        let data = Array2::from_shape_fn((4, 4), |(f, t)| (f * 4 + t) as u8);
        // Values 0..16: mean 7.5, population variance 21.25.
        let expected = 7.5 / (21.25_f64).sqrt();
        assert_abs_diff_eq!(signal_to_noise(&data), expected, epsilon = 1e-12);
    }

    #[test]
    fn checksum_is_an_equivalence_over_first_lines() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: &[u8]| {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(contents).unwrap();
            path
        };
        // b and c share a's first line but diverge afterwards. Checksum
        // equality is deliberately based on the first line only, so all
        // three compare equal; this is expected, not a bug.
        let a = write("a.fit", b"SIMPLE  = T\nBITPIX = 8\n");
        let b = write("b.fit", b"SIMPLE  = T\nBITPIX = 16\n");
        let c = write("c.fit", b"SIMPLE  = T\nTOTALLY DIFFERENT\n");
        let d = write("d.fit", b"SIMPLE  = F\nBITPIX = 8\n");

        let mut obs_a = Observation::default();
        let mut obs_b = Observation::default();
        let mut obs_c = Observation::default();
        let mut obs_d = Observation::default();
        obs_a.set_path(&a).unwrap();
        obs_b.set_path(&b).unwrap();
        obs_c.set_path(&c).unwrap();
        obs_d.set_path(&d).unwrap();

        // Reflexive, symmetric, transitive.
        assert!(obs_a.same_checksum(&obs_a));
        assert!(obs_a.same_checksum(&obs_b));
        assert!(obs_b.same_checksum(&obs_a));
        assert!(obs_b.same_checksum(&obs_c));
        assert!(obs_a.same_checksum(&obs_c));

        assert!(!obs_a.same_checksum(&obs_d));
    }

    #[test]
    fn header_accessors_report_missing_keys() {
        let obs = synthetic(10, 20);
        assert!(matches!(
            obs.observation_date(),
            Err(CallistoError::MissingHeaderKey { key: "DATE-OBS", .. })
        ));
    }
}
