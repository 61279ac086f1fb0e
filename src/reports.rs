//! Report assembly: wraps the aggregation results into their response JSON,
//! stamped with `lastUpdate`, and compares produced reports against
//! reference documents.

use chrono::Utc;
use log::warn;
use serde_json::{json, Value as JSValue};
use snafu::prelude::*;
use text_diff::print_diff;

use ballot_tally::{
    heat_map, nearest_location_report, quick_count, registration_progress,
    results_by_circunscripcion, results_by_location, system_statistics, BallotStatus, BallotStore,
    ElectionType, GeoLevel, ListQuery, MemoryBallotStore, MemoryReferenceStore, ReferenceStore,
    ResultsFilter,
};

use crate::args::Args;
use crate::ingest::IngestResult;

/// Default search radius of the nearest report, in meters.
const DEFAULT_MAX_DISTANCE_M: f64 = 5000.0;

pub fn run_report(
    name: &str,
    ballots: &MemoryBallotStore,
    reference: &MemoryReferenceStore,
    args: &Args,
) -> IngestResult<JSValue> {
    let filter = filter_from_args(args);
    let snapshot = ballots.all();
    match name {
        "quick-count" => {
            let r = quick_count(&snapshot);
            Ok(json!({
                "results": r.results,
                "summary": r.summary,
                "lastUpdate": Utc::now(),
            }))
        }
        "location" => {
            let election = election_type(args)?;
            let r = results_by_location(&snapshot, &filter, election);
            Ok(json!({
                "filters": filter,
                "electionType": election,
                "results": r.results,
                "summary": r.summary,
                "lastUpdate": Utc::now(),
            }))
        }
        "circunscripcion" => {
            let election = election_type(args)?;
            let groups = results_by_circunscripcion(&snapshot, &filter, election);
            Ok(json!({
                "circunscripciones": groups,
                "electionType": election,
                "lastUpdate": Utc::now(),
            }))
        }
        "progress" => {
            let expected = reference.count_tables(&filter);
            let r = registration_progress(&snapshot, expected, &filter);
            Ok(json!({
                "progress": r.progress,
                "byStatus": r.by_status,
                "filters": filter,
                "lastUpdate": Utc::now(),
            }))
        }
        "heat-map" => {
            let election = election_type(args)?;
            let level = geo_level(args)?;
            let cells = heat_map(&snapshot, election, level, args.department.as_deref());
            Ok(json!({
                "data": cells,
                "electionType": election,
                "lastUpdate": Utc::now(),
            }))
        }
        "stats" => {
            let r = system_statistics(&snapshot, Utc::now());
            Ok(json!({
                "summary": r.summary,
                "departmentCoverage": r.department_coverage,
                "recentActivity": r.recent_activity,
                "lastUpdate": Utc::now(),
            }))
        }
        "list" => {
            let page = ballots.list(&list_query(args)?);
            Ok(json!({
                "data": page.data,
                "total": page.total,
                "page": page.page,
                "pages": page.pages,
            }))
        }
        "ballot" => {
            let table_code = match &args.table_code {
                Some(c) => c,
                None => whatever!("The ballot report needs --table-code"),
            };
            match ballots.find_by_table_code(table_code) {
                Ok(ballot) => Ok(json!(ballot)),
                Err(e) => whatever!("{}", e),
            }
        }
        "nearest" => {
            let (latitude, longitude) = match (args.latitude, args.longitude) {
                (Some(lat), Some(lon)) => (lat, lon),
                _ => whatever!("The nearest report needs --latitude and --longitude"),
            };
            let max_distance = args.max_distance.unwrap_or(DEFAULT_MAX_DISTANCE_M);
            match nearest_location_report(ballots, reference, latitude, longitude, max_distance) {
                Ok(r) => Ok(json!({
                    "location": r.location,
                    "distance": r.distance,
                    "ballots": r.ballots,
                    "stats": r.stats,
                    "lastUpdate": Utc::now(),
                })),
                Err(e) => whatever!("{}", e),
            }
        }
        x => whatever!("Unknown report {:?}", x),
    }
}

fn filter_from_args(args: &Args) -> ResultsFilter {
    ResultsFilter {
        department: args.department.clone(),
        province: args.province.clone(),
        municipality: args.municipality.clone(),
        electoral_seat: args.electoral_seat.clone(),
        table_number: args.table_number.clone(),
        circunscripcion_type: args.circunscripcion_type.clone(),
        circunscripcion_number: args.circunscripcion_number,
    }
}

fn election_type(args: &Args) -> IngestResult<ElectionType> {
    match args.election_type.as_deref() {
        None | Some("presidential") => Ok(ElectionType::Presidential),
        Some("deputies") => Ok(ElectionType::Deputies),
        Some(x) => whatever!("Unknown election type {:?}", x),
    }
}

fn geo_level(args: &Args) -> IngestResult<GeoLevel> {
    match args.location_type.as_deref() {
        Some("department") => Ok(GeoLevel::Department),
        Some("province") => Ok(GeoLevel::Province),
        Some("municipality") => Ok(GeoLevel::Municipality),
        Some(x) => whatever!("Unknown location type {:?}", x),
        None => whatever!("The heat-map report needs --location-type"),
    }
}

fn list_query(args: &Args) -> IngestResult<ListQuery> {
    let status = match args.status.as_deref() {
        None => None,
        Some("pending") => Some(BallotStatus::Pending),
        Some("processed") => Some(BallotStatus::Processed),
        Some("synced") => Some(BallotStatus::Synced),
        Some("error") => Some(BallotStatus::Error),
        Some(x) => whatever!("Unknown ballot status {:?}", x),
    };
    let defaults = ListQuery::default();
    Ok(ListQuery {
        page: args.page.unwrap_or(defaults.page),
        limit: args.limit.unwrap_or(defaults.limit),
        status,
        department: args.department.clone(),
        province: args.province.clone(),
        municipality: args.municipality.clone(),
        circunscripcion_type: args.circunscripcion_type.clone(),
    })
}

/// Compares a produced report against a reference document, ignoring the
/// volatile `lastUpdate` stamps. Prints a diff and fails on mismatch.
pub fn check_against_reference(report: &JSValue, reference_path: &str) -> IngestResult<()> {
    let contents = match std::fs::read_to_string(reference_path) {
        Ok(c) => c,
        Err(e) => whatever!("Error opening reference report {}: {}", reference_path, e),
    };
    let mut expected: JSValue = match serde_json::from_str(&contents) {
        Ok(v) => v,
        Err(e) => whatever!("Error parsing reference report {}: {}", reference_path, e),
    };
    let mut actual = report.clone();
    strip_last_update(&mut expected);
    strip_last_update(&mut actual);

    let expected_pretty = match serde_json::to_string_pretty(&expected) {
        Ok(s) => s,
        Err(e) => whatever!("Error rendering reference report: {}", e),
    };
    let actual_pretty = match serde_json::to_string_pretty(&actual) {
        Ok(s) => s,
        Err(e) => whatever!("Error rendering report: {}", e),
    };
    if expected_pretty != actual_pretty {
        warn!("Found differences with the reference report");
        print_diff(expected_pretty.as_str(), actual_pretty.as_str(), "\n");
        whatever!("Difference detected between produced report and reference report");
    }
    Ok(())
}

fn strip_last_update(value: &mut JSValue) {
    match value {
        JSValue::Object(map) => {
            map.remove("lastUpdate");
            for v in map.values_mut() {
                strip_last_update(v);
            }
        }
        JSValue::Array(items) => {
            for v in items.iter_mut() {
                strip_last_update(v);
            }
        }
        _ => {}
    }
}
