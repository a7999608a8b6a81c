//! Thin wrappers around cfitsio for the handful of reads an e-Callisto file
//! needs. Anything the high-level `fitsio` API can't express (array-in-a-cell
//! columns, whole-header iteration) drops down to `fitsio-sys`.

use std::{fmt::Display, os::raw::c_char, path::Path};

use fitsio::{errors::check_status as fits_check_status, hdu::*, FitsFile};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitsError {
    #[error("couldn't open the FITS file: {0}")]
    Open(fitsio::errors::Error),

    #[error("couldn't open HDU {hdu}: {err}")]
    Hdu {
        hdu: String,
        err: fitsio::errors::Error,
    },

    #[error("HDU {hdu} is not an image")]
    NotImage { hdu: usize },

    #[error("HDU {hdu} is not a binary table")]
    NotTable { hdu: usize },

    #[error("expected a 2-D image, found {naxis} axes")]
    BadImageDimensions { naxis: usize },

    #[error("image shape {shape:?} didn't match the pixel count")]
    Shape { shape: Vec<usize> },

    #[error("no {col} column in the binary table")]
    MissingColumn { col: &'static str },

    #[error("couldn't read image data: {0}")]
    Image(fitsio::errors::Error),

    #[error("cfitsio error while {context} (status {status})")]
    Cfitsio { status: i32, context: &'static str },
}

/// Open a fits file.
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::open(file.as_ref()).map_err(FitsError::Open)
}

/// Open a fits file's HDU.
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fits_fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, FitsError> {
    fits_fptr.hdu(hdu_description).map_err(|err| FitsError::Hdu {
        hdu: hdu_description.to_string(),
        err,
    })
}

/// Given a FITS file pointer and a HDU, read the associated image.
pub(crate) fn fits_get_image<T: fitsio::images::ReadImage>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    hdu_num: usize,
) -> Result<T, FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { .. } => hdu.read_image(fits_fptr).map_err(FitsError::Image),
        _ => Err(FitsError::NotImage { hdu: hdu_num }),
    }
}

/// Get the size of the image on the supplied FITS file pointer and HDU.
pub(crate) fn fits_get_image_size(hdu: &FitsHdu, hdu_num: usize) -> Result<&Vec<usize>, FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => Ok(shape),
        _ => Err(FitsError::NotImage { hdu: hdu_num }),
    }
}

/// Pull out fits array-in-a-cell values; used for the TIME and FREQUENCY
/// columns of a Callisto binary table. This function assumes that the output
/// datatype is f64, and that the fits datatype is TDOUBLE, so it is not to be
/// used generally!
pub(crate) fn fits_read_cell_array(
    fits_ptr: &mut FitsFile,
    col_name: &'static str,
    row: i64,
    n_elem: i64,
) -> Result<Vec<f64>, FitsError> {
    unsafe {
        // With the column name, get the column number.
        let mut status = 0;
        let mut col_num = -1;
        let keyword = std::ffi::CString::new(col_name).expect("valid C string");
        // ffgcno = fits_get_colnum
        fitsio_sys::ffgcno(
            fits_ptr.as_raw(),
            0,
            keyword.as_ptr() as *mut c_char,
            &mut col_num,
            &mut status,
        );
        fits_check_status(status).map_err(|_| FitsError::Cfitsio {
            status,
            context: "finding the column number",
        })?;

        // Now get the specified row from that column.
        let mut array: Vec<f64> = vec![0.0; n_elem as usize];
        // ffgcv = fits_read_col
        fitsio_sys::ffgcv(
            fits_ptr.as_raw(),
            82, // TDOUBLE (fitsio.h)
            col_num,
            row + 1,
            1,
            n_elem,
            std::ptr::null_mut(),
            array.as_mut_ptr().cast(),
            &mut 0,
            &mut status,
        );
        fits_check_status(status).map_err(|_| FitsError::Cfitsio {
            status,
            context: "reading the cell array",
        })?;

        Ok(array)
    }
}

/// Read every keyword record of a HDU into (key, value) pairs. String values
/// lose their surrounding quotes and padding. COMMENT/HISTORY records and
/// blank keys are skipped.
pub(crate) fn fits_header_records(
    fits_ptr: &mut FitsFile,
) -> Result<Vec<(String, String)>, FitsError> {
    // FLEN_* are cfitsio's fixed buffer lengths (fitsio.h). FLEN_KEYWORD is
    // 75, not 9: ffgkyn returns full HIERARCH-convention names.
    const FLEN_KEYWORD: usize = 75;
    const FLEN_VALUE: usize = 71;
    const FLEN_COMMENT: usize = 73;

    let num_keys = unsafe {
        let mut status = 0;
        let mut num_keys = 0;
        let mut more_keys = 0;
        // ffghsp = fits_get_hdrspace
        fitsio_sys::ffghsp(fits_ptr.as_raw(), &mut num_keys, &mut more_keys, &mut status);
        fits_check_status(status).map_err(|_| FitsError::Cfitsio {
            status,
            context: "counting header records",
        })?;
        num_keys
    };

    let mut records = Vec::with_capacity(num_keys as usize);
    for i_key in 1..=num_keys {
        let mut name = [0 as c_char; FLEN_KEYWORD];
        let mut value = [0 as c_char; FLEN_VALUE];
        let mut comment = [0 as c_char; FLEN_COMMENT];
        unsafe {
            let mut status = 0;
            // ffgkyn = fits_read_keyn
            fitsio_sys::ffgkyn(
                fits_ptr.as_raw(),
                i_key,
                name.as_mut_ptr(),
                value.as_mut_ptr(),
                comment.as_mut_ptr(),
                &mut status,
            );
            fits_check_status(status).map_err(|_| FitsError::Cfitsio {
                status,
                context: "reading a header record",
            })?;

            let name = std::ffi::CStr::from_ptr(name.as_ptr())
                .to_string_lossy()
                .trim()
                .to_string();
            if name.is_empty() || name == "COMMENT" || name == "HISTORY" {
                continue;
            }
            let value = std::ffi::CStr::from_ptr(value.as_ptr())
                .to_string_lossy()
                .trim()
                .trim_matches('\'')
                .trim()
                .to_string();
            records.push((name, value));
        }
    }

    Ok(records)
}
