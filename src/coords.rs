//! Sexagesimal sky positions.
//!
//! Catalogue files and SIMBAD both give positions as whitespace-separated
//! sexagesimal fields: right ascension as `hh mm ss.ss` and declination as
//! `±dd mm ss.s`. Internally we keep RA in decimal hours and Dec in decimal
//! degrees.

use thiserror::Error;

/// Hours-to-degrees conversion factor
pub const H2D: f64 = 15.0;

/// Number of decimal places used when writing RA seconds.
pub const RA_PRECISION: usize = 2;

/// Number of decimal places used when writing Dec arcseconds.
pub const DEC_PRECISION: usize = 1;

#[derive(Debug, Error, PartialEq)]
pub enum CoordError {
    #[error("cannot interpret {0:?} as a sexagesimal field")]
    BadField(String),

    #[error("declination {0:?} has no leading sign")]
    MissingSign(String),

    #[error("{what} {value} out of range")]
    OutOfRange { what: &'static str, value: f64 },

    #[error("expected 6 sexagesimal fields, got {0}")]
    FieldCount(usize),
}

fn parse_field<T: std::str::FromStr>(text: &str) -> Result<T, CoordError> {
    text.parse()
        .map_err(|_| CoordError::BadField(text.to_owned()))
}

/// Parse right ascension fields into decimal hours.
pub fn hms_to_hours(h: &str, m: &str, s: &str) -> Result<f64, CoordError> {
    let h: u32 = parse_field(h)?;
    let m: u32 = parse_field(m)?;
    let s: f64 = parse_field(s)?;

    if m >= 60 {
        return Err(CoordError::OutOfRange {
            what: "RA minutes",
            value: m as f64,
        });
    }

    // NaN-sensitive
    if !(0. ..60.).contains(&s) {
        return Err(CoordError::OutOfRange {
            what: "RA seconds",
            value: s,
        });
    }

    let hours = h as f64 + m as f64 / 60. + s / 3600.;

    if hours >= 24. {
        return Err(CoordError::OutOfRange {
            what: "RA",
            value: hours,
        });
    }

    Ok(hours)
}

/// Parse declination fields into decimal degrees. The degrees field must carry
/// an explicit sign, so that `-00 30 00` cannot be silently read as positive.
pub fn dms_to_degrees(d: &str, m: &str, s: &str) -> Result<f64, CoordError> {
    let (sign, digits) = if let Some(rest) = d.strip_prefix('+') {
        (1., rest)
    } else if let Some(rest) = d.strip_prefix('-') {
        (-1., rest)
    } else {
        return Err(CoordError::MissingSign(d.to_owned()));
    };

    let d: u32 = parse_field(digits)?;
    let m: u32 = parse_field(m)?;
    let s: f64 = parse_field(s)?;

    if m >= 60 {
        return Err(CoordError::OutOfRange {
            what: "Dec arcminutes",
            value: m as f64,
        });
    }

    if !(0. ..60.).contains(&s) {
        return Err(CoordError::OutOfRange {
            what: "Dec arcseconds",
            value: s,
        });
    }

    let degrees = d as f64 + m as f64 / 60. + s / 3600.;

    if degrees > 90. {
        return Err(CoordError::OutOfRange {
            what: "Dec",
            value: degrees,
        });
    }

    Ok(sign * degrees)
}

/// Parse a position given as six fields, `hh mm ss.ss ±dd mm ss.s`.
pub fn parse_position(text: &str) -> Result<(f64, f64), CoordError> {
    let fields: Vec<&str> = text.split_whitespace().collect();

    if fields.len() != 6 {
        return Err(CoordError::FieldCount(fields.len()));
    }

    let ra = hms_to_hours(fields[0], fields[1], fields[2])?;
    let dec = dms_to_degrees(fields[3], fields[4], fields[5])?;
    Ok((ra, dec))
}

/// Split a non-negative value into (units, minutes, seconds) after rounding
/// the seconds to `precision` decimal places, carrying any overflow upwards.
fn split_sexagesimal(value: f64, precision: usize) -> (u64, u64, f64) {
    let scale = 10u64.pow(precision as u32);
    let total = (value * 3600. * scale as f64).round() as u64;
    let per_minute = 60 * scale;
    let per_unit = 60 * per_minute;

    let units = total / per_unit;
    let rem = total % per_unit;
    let minutes = rem / per_minute;
    let seconds = (rem % per_minute) as f64 / scale as f64;
    (units, minutes, seconds)
}

/// Format RA in decimal hours as `hh{sep}mm{sep}ss.ss`.
pub fn format_ra(hours: f64, sep: char) -> String {
    let (mut h, m, s) = split_sexagesimal(hours.rem_euclid(24.), RA_PRECISION);

    if h == 24 {
        h = 0;
    }

    format!(
        "{h:02}{sep}{m:02}{sep}{s:0width$.prec$}",
        width = RA_PRECISION + 3,
        prec = RA_PRECISION
    )
}

/// Format Dec in decimal degrees as `±dd{sep}mm{sep}ss.s`.
pub fn format_dec(degrees: f64, sep: char) -> String {
    let sign = if degrees < 0. { '-' } else { '+' };
    let (d, m, s) = split_sexagesimal(degrees.abs(), DEC_PRECISION);

    format!(
        "{sign}{d:02}{sep}{m:02}{sep}{s:0width$.prec$}",
        width = DEC_PRECISION + 3,
        prec = DEC_PRECISION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_ra() {
        let ra = hms_to_hours("12", "34", "54.59").unwrap();
        assert!((ra - (12. + 34. / 60. + 54.59 / 3600.)).abs() < 1e-12);
        assert_eq!(format_ra(ra, ' '), "12 34 54.59");
        assert_eq!(format_ra(ra, ':'), "12:34:54.59");
    }

    #[test]
    fn negative_zero_degree_declination_keeps_its_sign() {
        let dec = dms_to_degrees("-00", "30", "00.0").unwrap();
        assert_eq!(dec, -0.5);
        assert_eq!(format_dec(dec, ' '), "-00 30 00.0");
    }

    #[test]
    fn unsigned_declination_is_rejected() {
        assert_eq!(
            dms_to_degrees("37", "37", "44.1"),
            Err(CoordError::MissingSign("37".to_owned()))
        );
    }

    #[test]
    fn rounding_carries_into_minutes() {
        // 59.996 seconds rounds to 60.00 and must carry.
        let ra = hms_to_hours("01", "02", "59.996").unwrap();
        assert_eq!(format_ra(ra, ' '), "01 03 00.00");

        let dec = dms_to_degrees("+10", "59", "59.97").unwrap();
        assert_eq!(format_dec(dec, ' '), "+11 00 00.0");
    }

    #[test]
    fn out_of_range_fields() {
        assert!(hms_to_hours("24", "00", "00").is_err());
        assert!(hms_to_hours("10", "60", "00").is_err());
        assert!(dms_to_degrees("+91", "00", "00").is_err());
        assert!(dms_to_degrees("+10", "00", "nan").is_err());
    }

    #[test]
    fn six_field_positions() {
        let (ra, dec) = parse_position("12 34 54.5877 +37 37 44.115").unwrap();
        assert_eq!(format_ra(ra, ' '), "12 34 54.59");
        assert_eq!(format_dec(dec, ' '), "+37 37 44.1");
        assert_eq!(parse_position("12 34"), Err(CoordError::FieldCount(2)));
    }
}
