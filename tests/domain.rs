use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, TimeZone, Utc};

use eo_indices::domain::{
    BoundingBox, CloudCover, DateRange, Footprint, ImageFormat, IndexKind, parse_date,
};
use eo_indices::error::EoError;

#[test]
fn parse_bbox_in_lon_lon_lat_lat_order() {
    let bbox: BoundingBox = "14, 15, 8, 9".parse().unwrap();
    assert_eq!(bbox.min_lon, 14.0);
    assert_eq!(bbox.max_lon, 15.0);
    assert_eq!(bbox.min_lat, 8.0);
    assert_eq!(bbox.max_lat, 9.0);
}

#[test]
fn parse_bbox_invalid() {
    assert_matches!("14,15,8".parse::<BoundingBox>(), Err(EoError::InvalidBbox(_)));
    assert_matches!("a,b,c,d".parse::<BoundingBox>(), Err(EoError::InvalidBbox(_)));
    assert_matches!("14,15,8,NaN".parse::<BoundingBox>(), Err(EoError::InvalidBbox(_)));
}

#[test]
fn footprint_wkt_is_closed_ring() {
    let bbox: BoundingBox = "14,15,8,9".parse().unwrap();
    let footprint = Footprint::from_bbox(&bbox);
    assert_eq!(footprint.to_wkt(), "POLYGON((14 8, 15 8, 15 9, 14 9, 14 8))");
    footprint.validate().unwrap();
}

#[test]
fn footprint_out_of_range_is_query_error() {
    let bbox: BoundingBox = "14,15,8,95".parse().unwrap();
    assert_matches!(Footprint::from_bbox(&bbox).validate(), Err(EoError::Query(_)));

    let flat: BoundingBox = "14,14,8,9".parse().unwrap();
    assert_matches!(Footprint::from_bbox(&flat).validate(), Err(EoError::Query(_)));
}

#[test]
fn cloud_cover_grid() {
    assert_eq!(CloudCover::default().percent(), 30);
    assert_eq!("90".parse::<CloudCover>().unwrap().percent(), 90);
    assert_matches!("35".parse::<CloudCover>(), Err(EoError::InvalidCloudCover(_)));
    assert_matches!("-10".parse::<CloudCover>(), Err(EoError::InvalidCloudCover(_)));
}

#[test]
fn index_and_format_parse() {
    assert_eq!("ndvi".parse::<IndexKind>().unwrap(), IndexKind::Ndvi);
    assert_eq!("BAI".parse::<IndexKind>().unwrap(), IndexKind::Bai);
    assert_matches!("EVI".parse::<IndexKind>(), Err(EoError::InvalidIndex(_)));
    assert_eq!("jpg".parse::<ImageFormat>().unwrap().extension(), "jpg");
    assert_matches!("gif".parse::<ImageFormat>(), Err(EoError::InvalidImageFormat(_)));
}

#[test]
fn dates_default_to_thirty_days_before_now() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let resolved = DateRange::resolve(None, None, now);
    assert!(!resolved.clamped);
    assert_eq!(resolved.range.end, now);
    assert_eq!(resolved.range.start, now - Duration::days(30));
}

#[test]
fn explicit_dates_cover_whole_days() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let start = NaiveDate::from_ymd_opt(2024, 5, 1);
    let end = NaiveDate::from_ymd_opt(2024, 5, 10);
    let resolved = DateRange::resolve(start, end, now);
    assert_eq!(
        resolved.range.start,
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(
        resolved.range.end,
        Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap()
    );
}

#[test]
fn inverted_dates_are_clamped_to_last_thirty_days() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let start = NaiveDate::from_ymd_opt(2024, 5, 20);
    let end = NaiveDate::from_ymd_opt(2024, 5, 1);
    let resolved = DateRange::resolve(start, end, now);
    assert!(resolved.clamped);
    assert_eq!(resolved.range.end, now);
    assert_eq!(resolved.range.start, now - Duration::days(30));
}

#[test]
fn parse_date_rejects_other_layouts() {
    assert!(parse_date("2024-05-01").is_ok());
    assert_matches!(parse_date("01/05/2024"), Err(EoError::InvalidDate(_)));
}
