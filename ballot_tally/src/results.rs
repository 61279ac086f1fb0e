//! The results aggregation engine.
//!
//! Every operation recomputes from the full matching record set of the
//! snapshot it is given; there are no incremental views. Each function is a
//! pure projection: filter, build a grouping key, fold into an accumulator
//! map, sort, project.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::model::*;
use crate::store::{BallotStore, ReferenceStore, StoreError};

// **** Result shapes ****

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    pub valid_votes: u64,
    pub null_votes: u64,
    pub blank_votes: u64,
    pub total_votes: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickCountPartyResult {
    pub party_id: String,
    pub total_votes: u64,
    /// Distinct departments this party has votes in; a coverage signal for
    /// the early national count.
    pub departments_covered: u64,
    pub percentage: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickCountResult {
    pub results: Vec<QuickCountPartyResult>,
    pub summary: VoteSummary,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPartyResult {
    pub party_id: String,
    pub total_votes: u64,
    /// Distinct tables (by table code) contributing to this party's tally
    /// in the filtered result set.
    pub tables_processed: u64,
    pub percentage: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub valid_votes: u64,
    pub null_votes: u64,
    pub blank_votes: u64,
    pub total_votes: u64,
    /// Distinct tables present in the filtered result, not the reference
    /// universe.
    pub tables_processed: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResults {
    pub results: Vec<LocationPartyResult>,
    pub summary: LocationSummary,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub processed: u64,
    pub synced: u64,
    pub error: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_tables: u64,
    pub registered_ballots: u64,
    pub percentage: String,
    /// Expected minus registered. Goes negative when more ballots exist
    /// than reference tables; never clamped.
    pub pending: i64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationProgress {
    pub progress: ProgressSummary,
    pub by_status: StatusCounts,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircunscripcionPartyResult {
    pub party_id: String,
    pub total_votes: u64,
    pub percentage: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircunscripcionGroup {
    pub number: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub results: Vec<CircunscripcionPartyResult>,
    pub summary: VoteSummary,
}

/// Geographic grouping level of the heat map.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum GeoLevel {
    Department,
    Province,
    Municipality,
}

impl GeoLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoLevel::Department => "department",
            GeoLevel::Province => "province",
            GeoLevel::Municipality => "municipality",
        }
    }

    fn key<'a>(&self, ballot: &'a Ballot) -> &'a str {
        match self {
            GeoLevel::Department => &ballot.location.department,
            GeoLevel::Province => &ballot.location.province,
            GeoLevel::Municipality => &ballot.location.municipality,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatMapCell {
    pub location: String,
    pub location_type: String,
    /// Total ballot volume of the group: valid + null + blank.
    pub total_votes: u64,
    pub valid_votes: u64,
    /// Party id to percentage of the group's valid votes, rounded to two
    /// decimals; all zero when the group has no valid votes.
    pub party_percentages: BTreeMap<String, f64>,
    /// True turnout needs the external electoral-roll dataset, which is not
    /// modeled. Fixed at zero.
    /// TODO: compute from the electoral roll once that dataset is ingested.
    pub participation_rate: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentCoverage {
    pub department: String,
    pub ballot_count: u64,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyActivity {
    /// Creation hour truncated to "%Y-%m-%d %H:00".
    pub hour: String,
    pub count: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSummary {
    pub total_ballots: u64,
    pub by_status: StatusCounts,
    pub departments_covered: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatistics {
    pub summary: SystemSummary,
    pub department_coverage: Vec<DepartmentCoverage>,
    pub recent_activity: Vec<HourlyActivity>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCompletion {
    pub total_tables: u64,
    pub processed_tables: u64,
    pub completion_percentage: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestLocationReport {
    pub location: ElectoralLocation,
    /// Haversine distance from the query point, in meters.
    pub distance: f64,
    pub ballots: Vec<Ballot>,
    pub stats: LocationCompletion,
}

// **** Projection helpers ****

/// Formats `part / whole` as a fixed two-decimal percentage string, the
/// externally visible form. A zero denominator reports "0.00" instead of
/// failing; aggregations never raise on empty data.
fn percentage_string(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", part as f64 / whole as f64 * 100.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn is_registered(status: BallotStatus) -> bool {
    matches!(status, BallotStatus::Processed | BallotStatus::Synced)
}

// **** Aggregations ****

/// National quick count over the presidential vote list of all processed
/// ballots.
pub fn quick_count(ballots: &[Ballot]) -> QuickCountResult {
    let processed: Vec<&Ballot> = ballots
        .iter()
        .filter(|b| b.status == BallotStatus::Processed)
        .collect();
    info!("quick_count: tallying {} processed ballots", processed.len());

    let mut summary = VoteSummary::default();
    let mut tally: HashMap<String, (u64, HashSet<String>)> = HashMap::new();
    for ballot in &processed {
        summary.valid_votes += ballot.votes.valid_votes;
        summary.null_votes += ballot.votes.null_votes;
        summary.blank_votes += ballot.votes.blank_votes;
        for pv in &ballot.votes.party_votes {
            let entry = tally
                .entry(pv.party_id.clone())
                .or_insert_with(|| (0, HashSet::new()));
            entry.0 += pv.votes;
            entry.1.insert(ballot.location.department.clone());
        }
    }
    summary.total_votes = summary.valid_votes + summary.null_votes + summary.blank_votes;

    let mut results: Vec<QuickCountPartyResult> = tally
        .into_iter()
        .map(|(party_id, (total_votes, departments))| QuickCountPartyResult {
            percentage: percentage_string(total_votes, summary.valid_votes),
            party_id,
            total_votes,
            departments_covered: departments.len() as u64,
        })
        .collect();
    results.sort_by(|a, b| {
        b.total_votes
            .cmp(&a.total_votes)
            .then_with(|| a.party_id.cmp(&b.party_id))
    });
    QuickCountResult { results, summary }
}

/// Tally of the selected vote list restricted by the filter predicate.
pub fn results_by_location(
    ballots: &[Ballot],
    filter: &ResultsFilter,
    election: ElectionType,
) -> LocationResults {
    let matched: Vec<&Ballot> = ballots
        .iter()
        .filter(|b| b.status == BallotStatus::Processed && filter.matches(b))
        .collect();
    debug!(
        "results_by_location: {} of {} ballots match",
        matched.len(),
        ballots.len()
    );

    let mut summary = LocationSummary::default();
    let mut all_tables: HashSet<&str> = HashSet::new();
    let mut tally: HashMap<String, (u64, HashSet<String>)> = HashMap::new();
    for ballot in &matched {
        summary.valid_votes += ballot.votes.valid_votes;
        summary.null_votes += ballot.votes.null_votes;
        summary.blank_votes += ballot.votes.blank_votes;
        all_tables.insert(ballot.table_code.as_str());
        for pv in ballot.votes.votes_for(election) {
            let entry = tally
                .entry(pv.party_id.clone())
                .or_insert_with(|| (0, HashSet::new()));
            entry.0 += pv.votes;
            entry.1.insert(ballot.table_code.clone());
        }
    }
    summary.total_votes = summary.valid_votes + summary.null_votes + summary.blank_votes;
    summary.tables_processed = all_tables.len() as u64;

    let mut results: Vec<LocationPartyResult> = tally
        .into_iter()
        .map(|(party_id, (total_votes, tables))| LocationPartyResult {
            percentage: percentage_string(total_votes, summary.valid_votes),
            party_id,
            total_votes,
            tables_processed: tables.len() as u64,
        })
        .collect();
    results.sort_by(|a, b| {
        b.total_votes
            .cmp(&a.total_votes)
            .then_with(|| a.party_id.cmp(&b.party_id))
    });
    LocationResults { results, summary }
}

/// Registered ballots against the expected table universe.
///
/// `expected_tables` comes from the reference store under the same
/// geography filter; registered means processed or synced.
pub fn registration_progress(
    ballots: &[Ballot],
    expected_tables: u64,
    filter: &ResultsFilter,
) -> RegistrationProgress {
    let mut by_status = StatusCounts::default();
    let mut registered: u64 = 0;
    for ballot in ballots.iter().filter(|b| filter.matches(b)) {
        match ballot.status {
            BallotStatus::Pending => by_status.pending += 1,
            BallotStatus::Processed => by_status.processed += 1,
            BallotStatus::Synced => by_status.synced += 1,
            BallotStatus::Error => by_status.error += 1,
        }
        if is_registered(ballot.status) {
            registered += 1;
        }
    }
    info!(
        "registration_progress: {} registered of {} expected",
        registered, expected_tables
    );
    RegistrationProgress {
        progress: ProgressSummary {
            total_tables: expected_tables,
            registered_ballots: registered,
            percentage: percentage_string(registered, expected_tables),
            pending: expected_tables as i64 - registered as i64,
        },
        by_status,
    }
}

/// Results grouped by electoral district.
///
/// Groups come out sorted by district number; parties within a group by
/// total votes, descending.
pub fn results_by_circunscripcion(
    ballots: &[Ballot],
    filter: &ResultsFilter,
    election: ElectionType,
) -> Vec<CircunscripcionGroup> {
    struct GroupAcc {
        valid: u64,
        null: u64,
        blank: u64,
        tally: HashMap<String, u64>,
    }

    let mut groups: BTreeMap<Circunscripcion, GroupAcc> = BTreeMap::new();
    for ballot in ballots
        .iter()
        .filter(|b| b.status == BallotStatus::Processed && filter.matches(b))
    {
        let acc = groups
            .entry(ballot.location.circunscripcion.clone())
            .or_insert_with(|| GroupAcc {
                valid: 0,
                null: 0,
                blank: 0,
                tally: HashMap::new(),
            });
        acc.valid += ballot.votes.valid_votes;
        acc.null += ballot.votes.null_votes;
        acc.blank += ballot.votes.blank_votes;
        for pv in ballot.votes.votes_for(election) {
            *acc.tally.entry(pv.party_id.clone()).or_insert(0) += pv.votes;
        }
    }
    debug!("results_by_circunscripcion: {} groups", groups.len());

    // The BTreeMap ordering (number first) already yields districts in
    // ascending number order.
    groups
        .into_iter()
        .map(|(circunscripcion, acc)| {
            let mut results: Vec<CircunscripcionPartyResult> = acc
                .tally
                .into_iter()
                .map(|(party_id, total_votes)| CircunscripcionPartyResult {
                    percentage: if acc.valid == 0 {
                        "0".to_string()
                    } else {
                        percentage_string(total_votes, acc.valid)
                    },
                    party_id,
                    total_votes,
                })
                .collect();
            results.sort_by(|a, b| {
                b.total_votes
                    .cmp(&a.total_votes)
                    .then_with(|| a.party_id.cmp(&b.party_id))
            });
            CircunscripcionGroup {
                number: circunscripcion.number,
                kind: circunscripcion.kind,
                name: circunscripcion.name,
                results,
                summary: VoteSummary {
                    valid_votes: acc.valid,
                    null_votes: acc.null,
                    blank_votes: acc.blank,
                    total_votes: acc.valid + acc.null + acc.blank,
                },
            }
        })
        .collect()
}

/// Vote volumes and party shares grouped by a single geographic level.
///
/// The department prefilter applies only at municipality level; it is
/// ignored for the coarser groupings.
pub fn heat_map(
    ballots: &[Ballot],
    election: ElectionType,
    level: GeoLevel,
    department: Option<&str>,
) -> Vec<HeatMapCell> {
    struct CellAcc {
        total: u64,
        valid: u64,
        tally: HashMap<String, u64>,
    }

    let prefilter = match (level, department) {
        (GeoLevel::Municipality, Some(d)) => Some(d),
        _ => None,
    };

    let mut cells: BTreeMap<String, CellAcc> = BTreeMap::new();
    for ballot in ballots.iter().filter(|b| {
        b.status == BallotStatus::Processed
            && prefilter.map_or(true, |d| b.location.department == d)
    }) {
        let acc = cells
            .entry(level.key(ballot).to_string())
            .or_insert_with(|| CellAcc {
                total: 0,
                valid: 0,
                tally: HashMap::new(),
            });
        acc.total += ballot.votes.total_votes;
        acc.valid += ballot.votes.valid_votes;
        for pv in ballot.votes.votes_for(election) {
            *acc.tally.entry(pv.party_id.clone()).or_insert(0) += pv.votes;
        }
    }

    cells
        .into_iter()
        .map(|(location, acc)| HeatMapCell {
            location,
            location_type: level.as_str().to_string(),
            total_votes: acc.total,
            valid_votes: acc.valid,
            party_percentages: acc
                .tally
                .into_iter()
                .map(|(party_id, votes)| {
                    let pct = if acc.valid == 0 {
                        0.0
                    } else {
                        round2(votes as f64 / acc.valid as f64 * 100.0)
                    };
                    (party_id, pct)
                })
                .collect(),
            participation_rate: 0.0,
        })
        .collect()
}

/// Global counts, per-department coverage and the trailing 24-hour
/// ingestion histogram.
pub fn system_statistics(ballots: &[Ballot], now: DateTime<Utc>) -> SystemStatistics {
    let mut by_status = StatusCounts::default();
    let mut coverage: BTreeMap<String, (u64, Option<DateTime<Utc>>)> = BTreeMap::new();
    let cutoff = now - Duration::hours(24);
    let mut activity: BTreeMap<String, u64> = BTreeMap::new();

    for ballot in ballots {
        match ballot.status {
            BallotStatus::Pending => by_status.pending += 1,
            BallotStatus::Processed => by_status.processed += 1,
            BallotStatus::Synced => by_status.synced += 1,
            BallotStatus::Error => by_status.error += 1,
        }
        if ballot.status == BallotStatus::Processed {
            let entry = coverage
                .entry(ballot.location.department.clone())
                .or_insert((0, None));
            entry.0 += 1;
            entry.1 = match entry.1 {
                Some(t) if t >= ballot.updated_at => Some(t),
                _ => Some(ballot.updated_at),
            };
        }
        if ballot.created_at >= cutoff {
            let hour = ballot.created_at.format("%Y-%m-%d %H:00").to_string();
            *activity.entry(hour).or_insert(0) += 1;
        }
    }

    let department_coverage: Vec<DepartmentCoverage> = coverage
        .into_iter()
        .map(|(department, (ballot_count, last_update))| DepartmentCoverage {
            department,
            ballot_count,
            last_update,
        })
        .collect();
    SystemStatistics {
        summary: SystemSummary {
            total_ballots: ballots.len() as u64,
            by_status,
            departments_covered: department_coverage.len() as u64,
        },
        department_coverage,
        recent_activity: activity
            .into_iter()
            .map(|(hour, count)| HourlyActivity { hour, count })
            .collect(),
    }
}

/// Completion metrics for one electoral location; the RegistrationProgress
/// formula scoped to a single facility.
pub fn location_stats(ballots: &[Ballot], total_tables: u64) -> LocationCompletion {
    let processed = ballots.iter().filter(|b| is_registered(b.status)).count() as u64;
    LocationCompletion {
        total_tables,
        processed_tables: processed,
        completion_percentage: percentage_string(processed, total_tables),
    }
}

/// Finds the closest active location within the inclusive radius and
/// gathers its ballots and completion metrics.
pub fn nearest_location_report(
    ballots: &dyn BallotStore,
    reference: &dyn ReferenceStore,
    latitude: f64,
    longitude: f64,
    max_distance_m: f64,
) -> Result<NearestLocationReport, StoreError> {
    let hit = reference.nearest_location(latitude, longitude, max_distance_m)?;
    info!(
        "nearest_location_report: {} at {:.1} m",
        hit.location.id, hit.distance_m
    );
    let location_ballots = ballots.by_location(&hit.location.id);
    let total_tables = reference.count_tables_for_location(&hit.location.id);
    let stats = location_stats(&location_ballots, total_tables);
    Ok(NearestLocationReport {
        location: hit.location,
        distance: hit.distance_m,
        ballots: location_ballots,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_count_tallies_and_formats_percentages() {
        let ballots = vec![
            ballot("T-1", "La Paz", 100, 1, 2, &[("A", 60), ("B", 40)], &[]),
            ballot("T-2", "Oruro", 50, 0, 0, &[("A", 50)], &[]),
            ballot("T-3", "Oruro", 0, 0, 0, &[("A", 0), ("B", 0)], &[]),
        ];
        let qc = quick_count(&ballots);

        assert_eq!(qc.results.len(), 2);
        assert_eq!(qc.results[0].party_id, "A");
        assert_eq!(qc.results[0].total_votes, 110);
        assert_eq!(qc.results[0].percentage, "73.33");
        assert_eq!(qc.results[0].departments_covered, 2);
        assert_eq!(qc.results[1].party_id, "B");
        assert_eq!(qc.results[1].total_votes, 40);
        assert_eq!(qc.results[1].percentage, "26.67");
        assert_eq!(
            qc.summary,
            VoteSummary {
                valid_votes: 150,
                null_votes: 1,
                blank_votes: 2,
                total_votes: 153,
            }
        );
    }

    #[test]
    fn quick_count_ignores_unprocessed_ballots() {
        let mut pending = ballot("T-1", "La Paz", 10, 0, 0, &[("A", 10)], &[]);
        pending.status = BallotStatus::Pending;
        let mut synced = ballot("T-2", "La Paz", 10, 0, 0, &[("A", 10)], &[]);
        synced.status = BallotStatus::Synced;
        let qc = quick_count(&[pending, synced]);
        assert!(qc.results.is_empty());
        assert_eq!(qc.summary.total_votes, 0);
    }

    #[test]
    fn quick_count_reports_zero_percentages_without_valid_votes() {
        let ballots = vec![ballot("T-1", "La Paz", 0, 3, 4, &[("A", 0)], &[])];
        let qc = quick_count(&ballots);
        assert_eq!(qc.results[0].percentage, "0.00");
        assert_eq!(qc.summary.total_votes, 7);
    }

    #[test]
    fn results_by_location_selects_vote_list_and_counts_tables() {
        let ballots = vec![
            ballot(
                "T-1",
                "La Paz",
                100,
                0,
                0,
                &[("A", 100)],
                &[("A", 70), ("B", 30)],
            ),
            ballot("T-2", "Oruro", 50, 0, 0, &[("A", 50)], &[("B", 50)]),
        ];
        let filter = ResultsFilter::default();

        let presidential = results_by_location(&ballots, &filter, ElectionType::Presidential);
        assert_eq!(presidential.results[0].party_id, "A");
        assert_eq!(presidential.results[0].total_votes, 150);
        assert_eq!(presidential.results[0].tables_processed, 2);
        assert_eq!(presidential.summary.tables_processed, 2);

        let deputies = results_by_location(&ballots, &filter, ElectionType::Deputies);
        assert_eq!(deputies.results[0].party_id, "B");
        assert_eq!(deputies.results[0].total_votes, 80);
        assert_eq!(deputies.results[0].tables_processed, 2);
        assert_eq!(deputies.results[1].party_id, "A");
        assert_eq!(deputies.results[1].tables_processed, 1);
    }

    #[test]
    fn results_by_location_applies_filters() {
        let ballots = vec![
            ballot("T-1", "La Paz", 100, 0, 0, &[("A", 100)], &[]),
            ballot("T-2", "Oruro", 50, 0, 0, &[("A", 50)], &[]),
        ];
        let filter = ResultsFilter {
            department: Some("Oruro".to_string()),
            ..ResultsFilter::default()
        };
        let r = results_by_location(&ballots, &filter, ElectionType::Presidential);
        assert_eq!(r.summary.valid_votes, 50);
        assert_eq!(r.summary.tables_processed, 1);
        assert_eq!(r.results[0].percentage, "100.00");
    }

    #[test]
    fn registration_progress_reports_negative_pending_unclamped() {
        let mut b1 = ballot("T-1", "La Paz", 10, 0, 0, &[("A", 10)], &[]);
        b1.status = BallotStatus::Synced;
        let b2 = ballot("T-2", "La Paz", 10, 0, 0, &[("A", 10)], &[]);

        let progress = registration_progress(&[b1, b2], 0, &ResultsFilter::default());
        assert_eq!(progress.progress.registered_ballots, 2);
        assert_eq!(progress.progress.percentage, "0.00");
        assert_eq!(progress.progress.pending, -2);
        assert_eq!(progress.by_status.synced, 1);
        assert_eq!(progress.by_status.processed, 1);
    }

    #[test]
    fn registration_progress_counts_all_statuses_under_filter() {
        let mut error = ballot("T-1", "La Paz", 0, 0, 0, &[], &[]);
        error.status = BallotStatus::Error;
        let processed = ballot("T-2", "La Paz", 0, 0, 0, &[], &[]);
        let other = ballot("T-3", "Oruro", 0, 0, 0, &[], &[]);

        let filter = ResultsFilter {
            department: Some("La Paz".to_string()),
            ..ResultsFilter::default()
        };
        let progress = registration_progress(&[error, processed, other], 10, &filter);
        assert_eq!(progress.progress.registered_ballots, 1);
        assert_eq!(progress.progress.percentage, "10.00");
        assert_eq!(progress.progress.pending, 9);
        assert_eq!(progress.by_status.error, 1);
        assert_eq!(progress.by_status.processed, 1);
    }

    #[test]
    fn circunscripcion_groups_sorted_by_number_with_party_order() {
        let mut b1 = ballot("T-1", "La Paz", 100, 0, 0, &[("A", 60), ("B", 40)], &[]);
        b1.location.circunscripcion = circunscripcion(20);
        let mut b2 = ballot("T-2", "La Paz", 50, 1, 1, &[("B", 50)], &[]);
        b2.location.circunscripcion = circunscripcion(10);
        let mut b3 = ballot("T-3", "La Paz", 30, 0, 0, &[("B", 30)], &[]);
        b3.location.circunscripcion = circunscripcion(20);

        let groups =
            results_by_circunscripcion(&[b1, b2, b3], &ResultsFilter::default(), ElectionType::Presidential);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].number, 10);
        assert_eq!(groups[0].results[0].party_id, "B");
        assert_eq!(groups[0].results[0].percentage, "100.00");
        assert_eq!(groups[0].summary.total_votes, 52);

        assert_eq!(groups[1].number, 20);
        // B leads the district with 70 over A's 60.
        assert_eq!(groups[1].results[0].party_id, "B");
        assert_eq!(groups[1].results[0].total_votes, 70);
        assert_eq!(groups[1].results[1].party_id, "A");
        assert_eq!(groups[1].results[1].percentage, "46.15");
    }

    #[test]
    fn circunscripcion_group_without_valid_votes_reports_zero() {
        let ballots = vec![ballot("T-1", "La Paz", 0, 2, 1, &[("A", 0)], &[])];
        let groups =
            results_by_circunscripcion(&ballots, &ResultsFilter::default(), ElectionType::Presidential);
        assert_eq!(groups[0].results[0].percentage, "0");
        assert_eq!(groups[0].summary.total_votes, 3);
    }

    #[test]
    fn heat_map_percentages_bounded_and_zero_on_empty_groups() {
        let ballots = vec![
            ballot("T-1", "La Paz", 90, 5, 5, &[("A", 60), ("B", 30)], &[]),
            ballot("T-2", "Oruro", 0, 4, 0, &[("A", 0)], &[]),
        ];
        let cells = heat_map(&ballots, ElectionType::Presidential, GeoLevel::Department, None);
        assert_eq!(cells.len(), 2);

        let la_paz = &cells[0];
        assert_eq!(la_paz.location, "La Paz");
        assert_eq!(la_paz.total_votes, 100);
        assert_eq!(la_paz.valid_votes, 90);
        let sum: f64 = la_paz.party_percentages.values().sum();
        assert!(sum <= 100.0 + 1e-9, "percentages sum to {}", sum);
        assert_eq!(la_paz.party_percentages["A"], 66.67);
        assert_eq!(la_paz.party_percentages["B"], 33.33);
        assert_eq!(la_paz.participation_rate, 0.0);

        let oruro = &cells[1];
        assert_eq!(oruro.valid_votes, 0);
        assert_eq!(oruro.party_percentages["A"], 0.0);
    }

    #[test]
    fn heat_map_department_prefilter_only_at_municipality_level() {
        let ballots = vec![
            ballot("T-1", "La Paz", 10, 0, 0, &[("A", 10)], &[]),
            ballot("T-2", "Oruro", 20, 0, 0, &[("A", 20)], &[]),
        ];
        let municipal = heat_map(
            &ballots,
            ElectionType::Presidential,
            GeoLevel::Municipality,
            Some("La Paz"),
        );
        assert_eq!(municipal.len(), 1);

        // At department level the prefilter is not meaningful and ignored.
        let departmental = heat_map(
            &ballots,
            ElectionType::Presidential,
            GeoLevel::Department,
            Some("La Paz"),
        );
        assert_eq!(departmental.len(), 2);
    }

    #[test]
    fn system_statistics_window_excludes_old_ballots() {
        let now = Utc::now();
        let mut fresh = ballot("T-1", "La Paz", 10, 0, 0, &[("A", 10)], &[]);
        fresh.created_at = now - Duration::hours(2);
        fresh.updated_at = now;
        // Exactly on the boundary: still inside the window.
        let mut edge = ballot("T-2", "La Paz", 10, 0, 0, &[("A", 10)], &[]);
        edge.created_at = now - Duration::hours(24);
        edge.updated_at = now - Duration::hours(24);
        let mut stale = ballot("T-3", "Oruro", 10, 0, 0, &[("A", 10)], &[]);
        stale.created_at = now - Duration::hours(25);
        stale.status = BallotStatus::Error;

        let stats = system_statistics(&[fresh.clone(), edge, stale], now);
        assert_eq!(stats.summary.total_ballots, 3);
        assert_eq!(stats.summary.by_status.processed, 2);
        assert_eq!(stats.summary.by_status.error, 1);
        assert_eq!(stats.summary.departments_covered, 1);

        let total_recent: u64 = stats.recent_activity.iter().map(|a| a.count).sum();
        assert_eq!(total_recent, 2);
        let expected_hour = fresh.created_at.format("%Y-%m-%d %H:00").to_string();
        assert!(stats.recent_activity.iter().any(|a| a.hour == expected_hour));

        assert_eq!(stats.department_coverage.len(), 1);
        assert_eq!(stats.department_coverage[0].department, "La Paz");
        assert_eq!(stats.department_coverage[0].ballot_count, 2);
        assert_eq!(stats.department_coverage[0].last_update, Some(now));
    }

    #[test]
    fn location_stats_uses_progress_formula() {
        let mut synced = ballot("T-1", "La Paz", 0, 0, 0, &[], &[]);
        synced.status = BallotStatus::Synced;
        let processed = ballot("T-2", "La Paz", 0, 0, 0, &[], &[]);
        let mut errored = ballot("T-3", "La Paz", 0, 0, 0, &[], &[]);
        errored.status = BallotStatus::Error;

        let stats = location_stats(&[synced, processed, errored], 4);
        assert_eq!(stats.processed_tables, 2);
        assert_eq!(stats.completion_percentage, "50.00");

        let empty = location_stats(&[], 0);
        assert_eq!(empty.completion_percentage, "0.00");
    }

    // Builds a processed ballot with the given vote data; timestamps are
    // "now", which individual tests override where the window matters.
    fn ballot(
        table_code: &str,
        department: &str,
        valid: u64,
        null: u64,
        blank: u64,
        party_votes: &[(&str, u64)],
        deputy_votes: &[(&str, u64)],
    ) -> Ballot {
        let to_votes = |pairs: &[(&str, u64)]| -> Vec<PartyVote> {
            pairs
                .iter()
                .map(|(party_id, votes)| PartyVote {
                    party_id: party_id.to_string(),
                    votes: *votes,
                })
                .collect()
        };
        let mut votes = VoteTotals {
            valid_votes: valid,
            null_votes: null,
            blank_votes: blank,
            total_votes: 0,
            party_votes: to_votes(party_votes),
            deputy_votes: to_votes(deputy_votes),
        };
        votes.recompute_total();
        let now = Utc::now();
        Ballot {
            id: table_code.to_string(),
            table_code: table_code.to_string(),
            table_number: table_code.trim_start_matches("T-").to_string(),
            electoral_location_id: "L-1".to_string(),
            location: LocationSnapshot {
                department: department.to_string(),
                province: format!("{} province", department),
                municipality: department.to_string(),
                electoral_seat: "Centro".to_string(),
                electoral_location_name: "Colegio".to_string(),
                district: "1".to_string(),
                zone: "Z-1".to_string(),
                circunscripcion: circunscripcion(12),
            },
            votes,
            blockchain: None,
            ipfs_uri: format!("ipfs://Qm{}", table_code),
            ipfs_cid: format!("Qm{}", table_code),
            status: BallotStatus::Processed,
            created_at: now,
            updated_at: now,
        }
    }

    fn circunscripcion(number: u32) -> Circunscripcion {
        Circunscripcion {
            number,
            kind: "uninominal".to_string(),
            name: format!("C-{}", number),
        }
    }
}
