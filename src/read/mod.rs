//! The decode capability: turn an e-Callisto FITS file into arrays and a
//! header map.
//!
//! A Callisto file carries the intensity matrix as the primary 2-D image
//! (8-bit unsigned), and the time/frequency axes as two array-valued cells
//! (`TIME`, `FREQUENCY`) in the first row of a binary-table extension.

pub mod fits;

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use fitsio::hdu::HduInfo;
use log::debug;
use ndarray::{Array1, Array2};
use sha2::{Digest, Sha256};

use crate::CallistoError;
use fits::FitsError;

/// The raw product of one decoded file, before the trailing-channel
/// correction is applied.
pub struct DecodedObservation {
    pub time: Array1<f64>,
    pub freq: Array1<f64>,
    pub data: Array2<u8>,
    pub header: HashMap<String, String>,
}

/// Decode the primary image, the TIME/FREQUENCY vectors and the header of an
/// observation file.
pub fn decode_observation(path: &Path) -> Result<DecodedObservation, CallistoError> {
    decode_inner(path).map_err(|source| CallistoError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_inner(path: &Path) -> Result<DecodedObservation, FitsError> {
    debug!("Decoding {}", path.display());
    let mut fptr = fits::fits_open(path)?;

    let primary_hdu = fits::fits_open_hdu(&mut fptr, 0)?;
    let shape = fits::fits_get_image_size(&primary_hdu, 0)?.clone();
    if shape.len() != 2 {
        return Err(FitsError::BadImageDimensions { naxis: shape.len() });
    }
    let header = fits::fits_header_records(&mut fptr)?.into_iter().collect();
    let raw: Vec<u8> = fits::fits_get_image(&mut fptr, &primary_hdu, 0)?;
    let data = Array2::from_shape_vec((shape[0], shape[1]), raw)
        .map_err(|_| FitsError::Shape { shape })?;

    // The axis vectors live in one row of the first extension.
    let table_hdu = fits::fits_open_hdu(&mut fptr, 1)?;
    let (time_len, freq_len) = match &table_hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            ..
        } => {
            let repeat = |col: &'static str| {
                column_descriptions
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(col))
                    .map(|c| c.data_type.repeat)
                    .ok_or(FitsError::MissingColumn { col })
            };
            (repeat("TIME")?, repeat("FREQUENCY")?)
        }
        _ => return Err(FitsError::NotTable { hdu: 1 }),
    };
    let time = fits::fits_read_cell_array(&mut fptr, "TIME", 0, time_len as i64)?;
    let freq = fits::fits_read_cell_array(&mut fptr, "FREQUENCY", 0, freq_len as i64)?;
    debug!(
        "{}: {} channels x {} samples",
        path.display(),
        freq.len(),
        time.len()
    );

    Ok(DecodedObservation {
        time: Array1::from(time),
        freq: Array1::from(freq),
        data,
        header,
    })
}

/// SHA-256 of the file's first raw line (newline included). This is the
/// cheap identity digest backing [`crate::Observation::same_checksum`].
pub fn first_line_checksum<P: AsRef<Path>>(path: P) -> Result<String, std::io::Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut first_line = vec![];
    reader.read_until(b'\n', &mut first_line)?;
    Ok(format!("{:x}", Sha256::digest(&first_line)))
}

/// Write a small but structurally faithful observation file: an 8-bit
/// primary image with `DATE-OBS`/`TIME-OBS` keys, and a binary-table
/// extension whose first row holds the TIME and FREQUENCY vectors as
/// array-valued cells.
#[cfg(test)]
pub(crate) fn write_synthetic_fits(
    path: &Path,
    time: &[f64],
    freq: &[f64],
    data: &Array2<u8>,
) -> Result<(), fitsio::errors::Error> {
    use fitsio::images::{ImageDescription, ImageType};
    use fitsio::tables::{ColumnDataType, ColumnDescription};

    let description = ImageDescription {
        data_type: ImageType::UnsignedByte,
        dimensions: &[data.nrows(), data.ncols()],
    };
    let mut fptr = fitsio::FitsFile::create(path)
        .with_custom_primary(&description)
        .open()?;
    let hdu = fptr.primary_hdu()?;
    hdu.write_image(&mut fptr, data.as_slice().unwrap())?;
    hdu.write_key(&mut fptr, "DATE-OBS", "23/04/2015")?;
    hdu.write_key(&mut fptr, "TIME-OBS", "08:30:12.345")?;
    // Longer than 8 characters, so cfitsio stores it as a HIERARCH card.
    hdu.write_key(&mut fptr, "INSTRUMENT_STATION_LABEL", "TEST")?;

    let columns = [
        ColumnDescription::new("TIME")
            .with_type(ColumnDataType::Double)
            .that_repeats(time.len())
            .create()?,
        ColumnDescription::new("FREQUENCY")
            .with_type(ColumnDataType::Double)
            .that_repeats(freq.len())
            .create()?,
    ];
    let table = fptr.create_table("QUICKLOOK", &columns)?;
    table.write_col(&mut fptr, "TIME", time)?;
    table.write_col(&mut fptr, "FREQUENCY", freq)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn checksum_is_sha256_of_the_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.fit");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello\nrest is ignored").unwrap();

        assert_eq!(
            first_line_checksum(&path).unwrap(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn checksum_of_file_without_newline_covers_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.fit");
        let b = dir.path().join("b.fit");
        File::create(&a).unwrap().write_all(b"hello").unwrap();
        File::create(&b).unwrap().write_all(b"hello").unwrap();
        assert_eq!(
            first_line_checksum(&a).unwrap(),
            first_line_checksum(&b).unwrap()
        );
    }

    #[test]
    fn decoding_a_synthetic_file_recovers_arrays_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.fit");
        let time: Vec<f64> = (0..40).map(|i| 0.25 * f64::from(i)).collect();
        let freq: Vec<f64> = (0..20).map(|i| 90.0 - f64::from(i)).collect();
        let data = Array2::from_shape_fn((20, 40), |(f, t)| ((f * 5 + t) % 256) as u8);
        write_synthetic_fits(&path, &time, &freq, &data).unwrap();

        let decoded = decode_observation(&path).unwrap();
        assert_eq!(decoded.time.as_slice().unwrap(), time.as_slice());
        assert_eq!(decoded.freq.as_slice().unwrap(), freq.as_slice());
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.header["DATE-OBS"], "23/04/2015");
        assert_eq!(decoded.header["TIME-OBS"], "08:30:12.345");
        // HIERARCH-convention names come back whole, not truncated.
        assert_eq!(decoded.header["INSTRUMENT_STATION_LABEL"], "TEST");
    }

    #[test]
    fn decoding_a_missing_file_is_a_decode_error() {
        let res = decode_observation(Path::new("/no/such/file.fit"));
        assert!(matches!(res, Err(CallistoError::Decode { .. })));
    }

    #[test]
    fn decoding_a_malformed_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.fit");
        File::create(&path)
            .unwrap()
            .write_all(b"not a FITS file at all\n")
            .unwrap();
        let res = decode_observation(&path);
        assert!(matches!(res, Err(CallistoError::Decode { .. })));
    }
}
