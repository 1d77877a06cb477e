use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "UPPER")]
pub enum IndexKind {
    Ndvi,
    Bai,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Ndvi => write!(f, "NDVI"),
            IndexKind::Bai => write!(f, "BAI"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = EoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NDVI" => Ok(IndexKind::Ndvi),
            "BAI" => Ok(IndexKind::Bai),
            _ => Err(EoError::InvalidIndex(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Jpeg => write!(f, "jpeg"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = EoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            _ => Err(EoError::InvalidImageFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl FromStr for BoundingBox {
    type Err = EoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| EoError::InvalidBbox(value.to_string()))?;
        if parts.len() != 4 || parts.iter().any(|v| !v.is_finite()) {
            return Err(EoError::InvalidBbox(value.to_string()));
        }
        Ok(Self {
            min_lon: parts[0],
            max_lon: parts[1],
            min_lat: parts[2],
            max_lat: parts[3],
        })
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.max_lon, self.min_lat, self.max_lat
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footprint {
    ring: [(f64, f64); 5],
}

impl Footprint {
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        let BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        } = *bbox;
        Self {
            ring: [
                (min_lon, min_lat),
                (max_lon, min_lat),
                (max_lon, max_lat),
                (min_lon, max_lat),
                (min_lon, min_lat),
            ],
        }
    }

    pub fn ring(&self) -> &[(f64, f64); 5] {
        &self.ring
    }

    pub fn validate(&self) -> Result<(), EoError> {
        for (lon, lat) in &self.ring {
            if !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat) {
                return Err(EoError::Query(format!(
                    "malformed geometry: coordinate ({lon}, {lat}) out of range"
                )));
            }
        }
        let (lon0, lat0) = self.ring[0];
        let (lon2, lat2) = self.ring[2];
        if lon0 == lon2 || lat0 == lat2 {
            return Err(EoError::Query(
                "malformed geometry: footprint has zero area".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_wkt(&self) -> String {
        let coords = self
            .ring
            .iter()
            .map(|(lon, lat)| format!("{lon} {lat}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON(({coords}))")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CloudCover(u8);

impl CloudCover {
    pub const ALLOWED: [u8; 11] = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

    pub fn new(percent: u8) -> Result<Self, EoError> {
        if Self::ALLOWED.contains(&percent) {
            Ok(Self(percent))
        } else {
            Err(EoError::InvalidCloudCover(percent.to_string()))
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl Default for CloudCover {
    fn default() -> Self {
        Self(30)
    }
}

impl FromStr for CloudCover {
    type Err = EoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let percent = value
            .trim()
            .parse::<u8>()
            .map_err(|_| EoError::InvalidCloudCover(value.to_string()))?;
        Self::new(percent)
    }
}

impl fmt::Display for CloudCover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    pub range: DateRange,
    pub clamped: bool,
}

impl DateRange {
    pub const DEFAULT_SPAN_DAYS: i64 = 30;

    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> ResolvedDates {
        let end = match end {
            Some(date) => end_of_day(date),
            None => now,
        };
        let start = match start {
            Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
            None => end - Duration::days(Self::DEFAULT_SPAN_DAYS),
        };

        if start > end {
            return ResolvedDates {
                range: DateRange {
                    start: now - Duration::days(Self::DEFAULT_SPAN_DAYS),
                    end: now,
                },
                clamped: true,
            };
        }

        ResolvedDates {
            range: DateRange { start, end },
            clamped: false,
        }
    }
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::seconds(1)
}

pub fn parse_date(value: &str) -> Result<NaiveDate, EoError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| EoError::InvalidDate(value.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub id: String,
    pub identifier: String,
    pub filename: String,
    pub footprint: Option<String>,
    pub acquisition_date: Option<DateTime<Utc>>,
    pub cloud_cover_percent: Option<f64>,
    pub product_type: Option<String>,
    pub size_bytes: Option<u64>,
}

impl Scene {
    pub fn new(
        id: impl Into<String>,
        identifier: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            identifier: identifier.into(),
            filename: filename.into(),
            footprint: None,
            acquisition_date: None,
            cloud_cover_percent: None,
            product_type: None,
            size_bytes: None,
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_ring_is_closed() {
        let bbox: BoundingBox = "14,15,8,9".parse().unwrap();
        let footprint = Footprint::from_bbox(&bbox);
        let ring = footprint.ring();
        assert_eq!(ring[0], ring[4]);
        assert_eq!(ring[1], (15.0, 8.0));
        assert_eq!(ring[3], (14.0, 9.0));
        assert_eq!(
            footprint.to_wkt(),
            "POLYGON((14 8, 15 8, 15 9, 14 9, 14 8))"
        );
    }

    #[test]
    fn cloud_cover_rejects_off_grid_values() {
        assert!(CloudCover::new(35).is_err());
        assert_eq!(CloudCover::default().percent(), 30);
    }
}
