// ********* Ballot data model ***********

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored ballot.
///
/// The ingestion pipeline creates ballots as `Processed`. The external
/// blockchain synchronization job later advances them to `Synced` (or
/// `Error`); this crate never performs that transition itself.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotStatus {
    Pending,
    Processed,
    Synced,
    Error,
}

/// Which vote list of a ballot an aggregation reads.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionType {
    /// The presidential tally (`partyVotes`).
    Presidential,
    /// The legislative tally (`deputyVotes`).
    Deputies,
}

/// Votes received by one political party on one ballot.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyVote {
    pub party_id: String,
    pub votes: u64,
}

/// The vote counts recorded on a single ballot.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTotals {
    pub valid_votes: u64,
    pub null_votes: u64,
    pub blank_votes: u64,
    /// Derived. Recomputed on every write; an input-supplied value is never
    /// trusted.
    #[serde(default)]
    pub total_votes: u64,
    pub party_votes: Vec<PartyVote>,
    #[serde(default)]
    pub deputy_votes: Vec<PartyVote>,
}

impl VoteTotals {
    /// Restores the `total = valid + null + blank` invariant.
    pub fn recompute_total(&mut self) {
        self.total_votes = self.valid_votes + self.null_votes + self.blank_votes;
    }

    pub fn votes_for(&self, election: ElectionType) -> &[PartyVote] {
        match election {
            ElectionType::Presidential => &self.party_votes,
            ElectionType::Deputies => &self.deputy_votes,
        }
    }
}

/// Electoral-district descriptor, independent of administrative geography.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct Circunscripcion {
    pub number: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

/// Denormalized copy of the full geographic hierarchy, captured once at
/// ingestion time so that aggregations scan ballots without joins. If the
/// canonical hierarchy changes afterwards, the snapshot is not updated.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub department: String,
    pub province: String,
    pub municipality: String,
    pub electoral_seat: String,
    pub electoral_location_name: String,
    pub district: String,
    pub zone: String,
    pub circunscripcion: Circunscripcion,
}

/// Transaction metadata stamped by the out-of-scope synchronization job.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainStamp {
    pub transaction_hash: String,
    pub block_number: u64,
    pub last_sync_date: DateTime<Utc>,
}

/// One ingested ballot record ("acta"), the tally of a single polling table.
///
/// `table_code` is globally unique: at most one ballot can ever be registered
/// per physical table.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: String,
    pub table_code: String,
    pub table_number: String,
    pub electoral_location_id: String,
    pub location: LocationSnapshot,
    pub votes: VoteTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<BlockchainStamp>,
    pub ipfs_uri: String,
    pub ipfs_cid: String,
    pub status: BallotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the ingestion pipeline supplies for a new ballot. The store
/// assigns identity and timestamps at insertion and recomputes the total.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotDraft {
    pub table_code: String,
    pub table_number: String,
    pub electoral_location_id: String,
    pub location: LocationSnapshot,
    pub votes: VoteTotals,
    pub ipfs_uri: String,
    pub ipfs_cid: String,
    pub status: BallotStatus,
}

// ********* Reference hierarchy (read-only for this crate) ***********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Province {
    pub id: String,
    pub name: String,
    pub department_id: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Municipality {
    pub id: String,
    pub name: String,
    pub province_id: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectoralSeat {
    pub id: String,
    pub name: String,
    pub municipality_id: String,
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// The facility housing one or more polling tables.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectoralLocation {
    pub id: String,
    pub name: String,
    pub address: String,
    pub district: String,
    pub zone: String,
    pub electoral_seat_id: String,
    pub coordinates: GeoPoint,
    pub circunscripcion: Circunscripcion,
    pub active: bool,
}

/// One expected polling table; the denominator universe for progress metrics.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectoralTable {
    pub table_code: String,
    pub table_number: String,
    pub electoral_location_id: String,
    pub active: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoliticalParty {
    pub id: String,
    pub name: String,
}

// ********* Filters ***********

/// Optional filter set applied by the aggregation operations. Unset fields
/// match everything.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electoral_seat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circunscripcion_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circunscripcion_number: Option<u32>,
}

impl ResultsFilter {
    pub fn matches(&self, ballot: &Ballot) -> bool {
        fn field_matches(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }
        field_matches(&self.department, &ballot.location.department)
            && field_matches(&self.province, &ballot.location.province)
            && field_matches(&self.municipality, &ballot.location.municipality)
            && field_matches(&self.electoral_seat, &ballot.location.electoral_seat)
            && field_matches(&self.table_number, &ballot.table_number)
            && field_matches(
                &self.circunscripcion_type,
                &ballot.location.circunscripcion.kind,
            )
            && self
                .circunscripcion_number
                .map_or(true, |n| n == ballot.location.circunscripcion.number)
    }

    /// True when no geographic field restricts the match.
    pub fn is_unrestricted(&self) -> bool {
        *self == ResultsFilter::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_votes_recomputed_from_parts() {
        let mut votes = VoteTotals {
            valid_votes: 100,
            null_votes: 3,
            blank_votes: 7,
            // A bogus input-supplied total must be discarded.
            total_votes: 999,
            party_votes: vec![],
            deputy_votes: vec![],
        };
        votes.recompute_total();
        assert_eq!(votes.total_votes, 110);
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let ballot = test_ballot();
        let mut filter = ResultsFilter::default();
        assert!(filter.matches(&ballot));

        filter.department = Some("La Paz".to_string());
        filter.circunscripcion_number = Some(12);
        assert!(filter.matches(&ballot));

        filter.province = Some("Murillo".to_string());
        assert!(filter.matches(&ballot));

        filter.province = Some("Elsewhere".to_string());
        assert!(!filter.matches(&ballot));
    }

    fn test_ballot() -> Ballot {
        Ballot {
            id: "000001".to_string(),
            table_code: "T-001".to_string(),
            table_number: "1".to_string(),
            electoral_location_id: "L-1".to_string(),
            location: LocationSnapshot {
                department: "La Paz".to_string(),
                province: "Murillo".to_string(),
                municipality: "La Paz".to_string(),
                electoral_seat: "Centro".to_string(),
                electoral_location_name: "Colegio Ayacucho".to_string(),
                district: "1".to_string(),
                zone: "Casco Viejo".to_string(),
                circunscripcion: Circunscripcion {
                    number: 12,
                    kind: "uninominal".to_string(),
                    name: "C-12".to_string(),
                },
            },
            votes: VoteTotals::default(),
            blockchain: None,
            ipfs_uri: "ipfs://QmTest".to_string(),
            ipfs_cid: "QmTest".to_string(),
            status: BallotStatus::Processed,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}
