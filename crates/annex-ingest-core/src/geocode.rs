use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;

use crate::metadata::{Metadata, UNKNOWN};
use crate::runlog::RunLog;

/// Address components extracted from a reverse-geocoding result. Fields the
/// lookup could not resolve hold the "unknown" placeholder, so the tag keys
/// are always present when place lookup is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub county: String,
    pub state: String,
    pub country: String,
    pub locality: String,
}

impl Place {
    pub fn unknown() -> Self {
        Self {
            county: UNKNOWN.to_string(),
            state: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
            locality: UNKNOWN.to_string(),
        }
    }
}

/// The external reverse-geocoding collaborator.
pub trait Geocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> anyhow::Result<Place>;
}

/// Nominatim's public reverse endpoint. Blocking, one request per file with
/// GPS data; the service requires an identifying user agent.
pub struct Nominatim {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl Nominatim {
    pub fn new() -> Self {
        Self::with_endpoint("https://nominatim.openstreetmap.org")
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("annex-ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl Default for Nominatim {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ReverseResponse {
    address: Option<ReverseAddress>,
}

#[derive(Deserialize, Default)]
struct ReverseAddress {
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

impl Geocoder for Nominatim {
    fn reverse(&self, latitude: f64, longitude: f64) -> anyhow::Result<Place> {
        let lat = latitude.to_string();
        let lon = longitude.to_string();
        let response: ReverseResponse = self
            .client
            .get(format!("{}/reverse", self.endpoint))
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
            ])
            .send()
            .context("reverse geocoding request failed")?
            .error_for_status()?
            .json()
            .context("reverse geocoding returned unparseable JSON")?;

        let address = response.address.unwrap_or_default();
        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN.to_string());
        Ok(Place {
            county: or_unknown(address.county),
            state: or_unknown(address.state),
            country: or_unknown(address.country),
            locality: or_unknown(address.city.or(address.town).or(address.village)),
        })
    }
}

// "53 deg 14' 41.00\"", exiftool's human-readable coordinate form.
static DMS_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(\d+(?:\.\d+)?)\s*deg\s*(\d+(?:\.\d+)?)'\s*(\d+(?:\.\d+)?)""#).unwrap()
});

/// Parse a coordinate value into [degrees, minutes, seconds].
///
/// Accepts the rational-triple form (`53/1 14/1 41/1`, commas tolerated)
/// and exiftool's textual form (`53 deg 14' 41.00" N`).
pub fn parse_dms(value: &str) -> Option<[f64; 3]> {
    if let Some(caps) = DMS_TEXT_RE.captures(value) {
        return Some([
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        ]);
    }

    let parts: Vec<f64> = value
        .split(|c: char| c == ' ' || c == ',')
        .filter(|p| !p.is_empty())
        .map(parse_rational)
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [d, m, s] => Some([*d, *m, *s]),
        _ => None,
    }
}

/// "53/1" -> 53.0; plain decimals pass through.
fn parse_rational(token: &str) -> Option<f64> {
    match token.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num / den)
        }
        None => token.trim().parse().ok(),
    }
}

/// Convert a coordinate value plus hemisphere reference to signed decimal
/// degrees. South and West are negative. When the reference field is
/// missing, a trailing hemisphere letter in the textual form is used.
pub fn decimal_degrees(value: &str, reference: &str) -> Option<f64> {
    let [d, m, s] = parse_dms(value)?;
    let magnitude = d + m / 60.0 + s / 3600.0;

    let reference = reference.trim().to_ascii_uppercase();
    let hemisphere = match reference.as_str() {
        "N" | "S" | "E" | "W" => reference,
        _ => value
            .trim()
            .chars()
            .last()
            .map(|c| c.to_ascii_uppercase().to_string())
            .unwrap_or_default(),
    };

    let sign = if hemisphere == "S" || hemisphere == "W" {
        -1.0
    } else {
        1.0
    };
    Some(sign * magnitude)
}

/// Resolve place tags for one record. Never fails: missing GPS data, a
/// malformed coordinate or a lookup error all collapse to the "unknown"
/// placeholder set.
pub fn resolve_place(metadata: &Metadata, geocoder: &dyn Geocoder, log: &RunLog) -> Place {
    let lat = metadata
        .lookup("GPSLatitude")
        .and_then(|v| decimal_degrees(v, metadata.get("GPSLatitudeRef")));
    let lon = metadata
        .lookup("GPSLongitude")
        .and_then(|v| decimal_degrees(v, metadata.get("GPSLongitudeRef")));

    let (Some(lat), Some(lon)) = (lat, lon) else {
        log.debug(format!(
            "no usable GPS data for {}",
            metadata.get("SourceFile")
        ));
        return Place::unknown();
    };

    match geocoder.reverse(lat, lon) {
        Ok(place) => place,
        Err(e) => {
            log.warn(format!(
                "place lookup failed for {:.6},{:.6}: {}",
                lat, lon, e
            ));
            Place::unknown()
        }
    }
}
