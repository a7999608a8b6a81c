//! Axis geometry for quicklook plots: tick placement, timestamp handling and
//! the dense-frequency "black band" reconstruction.

use hifitime::{Duration, Epoch};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::{CallistoError, Observation};

/// Parallel tick positions (indices into an axis) and their labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisTicks {
    pub positions: Vec<usize>,
    pub labels: Vec<String>,
}

impl AxisTicks {
    fn empty() -> AxisTicks {
        AxisTicks {
            positions: vec![],
            labels: vec![],
        }
    }
}

/// Combine `DATE-OBS` (day/month/year, slash-separated) and `TIME-OBS`
/// (`HH:MM:SS`, fractional seconds discarded) into a single UTC epoch at
/// second resolution.
pub fn parse_timestamp(date: &str, time: &str) -> Result<Epoch, CallistoError> {
    let malformed = || CallistoError::Parse {
        field: "DATE-OBS/TIME-OBS",
        value: format!("{date} {time}"),
    };

    let mut dmy = date.split('/');
    let (day, month, year) = match (dmy.next(), dmy.next(), dmy.next(), dmy.next()) {
        (Some(d), Some(m), Some(y), None) => (
            d.trim().parse::<u8>().map_err(|_| malformed())?,
            m.trim().parse::<u8>().map_err(|_| malformed())?,
            y.trim().parse::<i32>().map_err(|_| malformed())?,
        ),
        _ => return Err(malformed()),
    };

    // Everything after the last '.' is sub-second and discarded.
    let hms = match time.rfind('.') {
        Some(i) => &time[..i],
        None => time,
    };
    let mut hms = hms.split(':');
    let (hour, minute, second) = match (hms.next(), hms.next(), hms.next(), hms.next()) {
        (Some(h), Some(m), Some(s), None) => (
            h.trim().parse::<u8>().map_err(|_| malformed())?,
            m.trim().parse::<u8>().map_err(|_| malformed())?,
            s.trim().parse::<u8>().map_err(|_| malformed())?,
        ),
        _ => return Err(malformed()),
    };

    Epoch::maybe_from_gregorian_utc(year, month, day, hour, minute, second, 0)
        .map_err(|_| malformed())
}

/// The observation's start timestamp, from its header.
pub fn observation_timestamp(obs: &Observation) -> Result<Epoch, CallistoError> {
    parse_timestamp(obs.observation_date()?, obs.observation_start_time()?)
}

/// Place `count` roughly-equal ticks along the time axis. Tick labels are the
/// wall-clock time of `start + time[position]`. The final tick is pulled back
/// one index so it never lands beyond the last valid sample.
pub fn time_axis_ticks(time: ArrayView1<f64>, start: Epoch, count: usize) -> AxisTicks {
    let num_samples = time.len();
    if num_samples == 0 {
        return AxisTicks::empty();
    }

    let step = (num_samples / count.max(1)).max(1);
    let mut positions: Vec<usize> = (0..)
        .map(|i| i * step)
        .take_while(|&p| p <= num_samples)
        .collect();
    if let Some(last) = positions.last_mut() {
        *last = last.saturating_sub(1).min(num_samples - 1);
    }

    let labels = positions
        .iter()
        .map(|&p| format_hms(start + Duration::from_seconds(time[p])))
        .collect();
    AxisTicks { positions, labels }
}

/// Place `count` evenly spaced ticks along a frequency axis, labelled with
/// the frequency rounded to whole MHz.
pub fn frequency_axis_ticks(freq: ArrayView1<f64>, count: usize) -> AxisTicks {
    let num_chans = freq.len();
    if num_chans == 0 {
        return AxisTicks::empty();
    }

    let step = (num_chans / count.max(1)).max(1);
    let positions: Vec<usize> = (0..num_chans).step_by(step).collect();
    let labels = positions.iter().map(|&p| format!("{:.0}", freq[p])).collect();
    AxisTicks { positions, labels }
}

/// Re-grid sparse instrument channels onto a dense descending integer
/// frequency axis over `[fmin, fmax)`. Channels are matched by flooring their
/// frequency; dense rows with no matching channel stay NaN, which the
/// renderer draws as a black band instead of interpolating across the gap.
/// When several channels floor to the same integer the last one wins.
pub fn reconstruct_with_gaps(
    freq: ArrayView1<f64>,
    data: ArrayView2<f32>,
    fmin: i64,
    fmax: i64,
) -> (Array1<f64>, Array2<f32>) {
    let num_samples = data.ncols();
    let dense_len = (fmax - fmin).max(0) as usize;
    let dense_freq = Array1::from_iter((0..dense_len).map(|i| (fmax - 1 - i as i64) as f64));
    let mut dense_data = Array2::from_elem((dense_len, num_samples), f32::NAN);

    for (i_chan, &f) in freq.iter().enumerate() {
        let floored = f.floor() as i64;
        if floored >= fmin && floored < fmax {
            let dense_row = (fmax - 1 - floored) as usize;
            dense_data.row_mut(dense_row).assign(&data.row(i_chan));
        }
    }

    (dense_freq, dense_data)
}

/// `prefix sep YYYYMMDD sep HHMMSS`, the stem every output image uses.
pub fn output_name(timestamp: Epoch, prefix: &str, sep: &str) -> String {
    let (year, month, day, hour, minute, second, _) = timestamp.to_gregorian_utc();
    format!("{prefix}{sep}{year:04}{month:02}{day:02}{sep}{hour:02}{minute:02}{second:02}")
}

/// `HH:MM:SS` of an epoch's UTC wall-clock time.
pub fn format_hms(timestamp: Epoch) -> String {
    let (_, _, _, hour, minute, second, _) = timestamp.to_gregorian_utc();
    format!("{hour:02}:{minute:02}:{second:02}")
}

/// `YYYY-MM-DD HH:MM:SS`, used in plot titles.
pub fn format_full(timestamp: Epoch) -> String {
    let (year, month, day, hour, minute, second, _) = timestamp.to_gregorian_utc();
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}
