/// GNSS fix parsing for the modem's `AT+CGNSINF` report.
///
/// Response format (comma-delimited):
/// `+CGNSINF: <run>,<fix>,<utc>,<lat>,<lon>,<alt>,<speed>,...`
/// A fix is valid only when `<fix>` is `1` and at least six fields are present.

/// Index of the fix-status field
const FIX_FIELD: usize = 1;
const LAT_FIELD: usize = 3;
const LON_FIELD: usize = 4;
const MIN_FIELDS: usize = 6;

/// Response prefix for the GNSS info query
pub const CGNSINF_PREFIX: &str = "+CGNSINF:";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parse a `+CGNSINF:` line. Returns `None` for anything that is not a
/// valid fix; a missing fix is not an error.
pub fn parse_gnss_info(line: &str) -> Option<GpsFix> {
    let body = line.trim().strip_prefix(CGNSINF_PREFIX)?.trim_start();

    let mut fields: heapless::Vec<&str, 24> = heapless::Vec::new();
    for field in body.split(',') {
        if fields.push(field.trim()).is_err() {
            break;
        }
    }

    if fields.len() < MIN_FIELDS || fields[FIX_FIELD] != "1" {
        return None;
    }

    let latitude = fields[LAT_FIELD].parse::<f64>().ok()?;
    let longitude = fields[LON_FIELD].parse::<f64>().ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }

    Some(GpsFix {
        latitude,
        longitude,
    })
}
