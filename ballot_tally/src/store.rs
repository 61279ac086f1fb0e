// ********* Ballot and reference stores ***********

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::Display;

use chrono::Utc;
use geo::{Distance, Haversine, Point};
use log::debug;

use crate::model::*;

/// Errors surfaced by the storage layer.
///
/// Duplicate keys are a typed result of `insert`, not an error code the
/// caller has to inspect.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A ballot already exists for this table code. The loser of a
    /// concurrent registration race receives this; nothing is overwritten.
    DuplicateTableCode(String),
    BallotNotFound(String),
    LocationNotFound(String),
    /// No active electoral location within the given radius, in meters.
    NoLocationInRadius(f64),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateTableCode(code) => {
                write!(f, "a ballot is already registered for table {}", code)
            }
            StoreError::BallotNotFound(id) => write!(f, "ballot {} not found", id),
            StoreError::LocationNotFound(id) => {
                write!(f, "electoral location {} not found", id)
            }
            StoreError::NoLocationInRadius(radius) => write!(
                f,
                "no electoral location found within a radius of {} meters",
                radius
            ),
        }
    }
}

impl Error for StoreError {}

/// Pagination request for ballot listings.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ListQuery {
    pub page: u64,
    pub limit: u64,
    pub status: Option<BallotStatus>,
    pub department: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub circunscripcion_type: Option<String>,
}

impl Default for ListQuery {
    fn default() -> ListQuery {
        ListQuery {
            page: 1,
            limit: 10,
            status: None,
            department: None,
            province: None,
            municipality: None,
            circunscripcion_type: None,
        }
    }
}

/// One page of a filtered listing.
#[derive(Eq, PartialEq, Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
}

/// The append-mostly collection of ingested ballots.
///
/// Reads return owned point-in-time snapshots, so aggregations can run
/// against them while ingestion continues.
pub trait BallotStore {
    /// Inserts a new ballot, enforcing the `table_code` uniqueness
    /// constraint. Totals are recomputed here; identity and timestamps are
    /// assigned here.
    fn insert(&mut self, draft: BallotDraft) -> Result<Ballot, StoreError>;
    fn all(&self) -> Vec<Ballot>;
    fn find_by_id(&self, id: &str) -> Result<Ballot, StoreError>;
    fn find_by_table_code(&self, table_code: &str) -> Result<Ballot, StoreError>;
    /// All ballots registered under one electoral location, sorted by table
    /// number.
    fn by_location(&self, location_id: &str) -> Vec<Ballot>;
    fn list(&self, query: &ListQuery) -> Page<Ballot>;
}

/// A proximity hit from the nearest-location search.
#[derive(PartialEq, Debug, Clone)]
pub struct NearbyLocation {
    pub location: ElectoralLocation,
    pub distance_m: f64,
}

/// Read-only view of the reference hierarchy: geography, the expected table
/// universe and the registered political parties. Owned and mutated outside
/// this crate.
pub trait ReferenceStore {
    fn table_exists(&self, table_code: &str) -> bool;
    /// Number of expected tables under the geography fields of the filter
    /// (department, province, municipality); other filter fields are
    /// ignored since reference tables carry no election data.
    fn count_tables(&self, filter: &ResultsFilter) -> u64;
    fn count_tables_for_location(&self, location_id: &str) -> u64;
    fn location(&self, id: &str) -> Option<ElectoralLocation>;
    /// Denormalizes the full hierarchy for one location through an explicit
    /// batched-lookup join: location -> seat -> municipality -> province ->
    /// department.
    fn location_snapshot(&self, id: &str) -> Result<LocationSnapshot, StoreError>;
    fn party_known(&self, party_id: &str) -> bool;
    /// Closest active location within `max_distance_m` meters of the given
    /// point. The boundary is inclusive: a location at exactly the maximum
    /// distance qualifies.
    fn nearest_location(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_m: f64,
    ) -> Result<NearbyLocation, StoreError>;
}

// ********* In-memory implementations ***********

/// In-memory ballot store backing the CLI and the tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBallotStore {
    ballots: Vec<Ballot>,
    by_code: HashMap<String, usize>,
    next_id: u64,
}

impl MemoryBallotStore {
    pub fn new() -> MemoryBallotStore {
        MemoryBallotStore::default()
    }

    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }
}

impl BallotStore for MemoryBallotStore {
    fn insert(&mut self, draft: BallotDraft) -> Result<Ballot, StoreError> {
        if self.by_code.contains_key(&draft.table_code) {
            return Err(StoreError::DuplicateTableCode(draft.table_code));
        }
        let now = Utc::now();
        self.next_id += 1;
        let mut votes = draft.votes;
        votes.recompute_total();
        let ballot = Ballot {
            id: format!("{:06}", self.next_id),
            table_code: draft.table_code,
            table_number: draft.table_number,
            electoral_location_id: draft.electoral_location_id,
            location: draft.location,
            votes,
            blockchain: None,
            ipfs_uri: draft.ipfs_uri,
            ipfs_cid: draft.ipfs_cid,
            status: draft.status,
            created_at: now,
            updated_at: now,
        };
        debug!("insert: ballot {} for table {}", ballot.id, ballot.table_code);
        self.by_code
            .insert(ballot.table_code.clone(), self.ballots.len());
        self.ballots.push(ballot.clone());
        Ok(ballot)
    }

    fn all(&self) -> Vec<Ballot> {
        self.ballots.clone()
    }

    fn find_by_id(&self, id: &str) -> Result<Ballot, StoreError> {
        self.ballots
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| StoreError::BallotNotFound(id.to_string()))
    }

    fn find_by_table_code(&self, table_code: &str) -> Result<Ballot, StoreError> {
        self.by_code
            .get(table_code)
            .map(|&idx| self.ballots[idx].clone())
            .ok_or_else(|| StoreError::BallotNotFound(table_code.to_string()))
    }

    fn by_location(&self, location_id: &str) -> Vec<Ballot> {
        let mut found: Vec<Ballot> = self
            .ballots
            .iter()
            .filter(|b| b.electoral_location_id == location_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.table_number.cmp(&b.table_number));
        found
    }

    fn list(&self, query: &ListQuery) -> Page<Ballot> {
        let matches = |b: &Ballot| -> bool {
            query.status.map_or(true, |s| b.status == s)
                && query
                    .department
                    .as_deref()
                    .map_or(true, |d| b.location.department == d)
                && query
                    .province
                    .as_deref()
                    .map_or(true, |p| b.location.province == p)
                && query
                    .municipality
                    .as_deref()
                    .map_or(true, |m| b.location.municipality == m)
                && query
                    .circunscripcion_type
                    .as_deref()
                    .map_or(true, |c| b.location.circunscripcion.kind == c)
        };
        let mut filtered: Vec<Ballot> = self.ballots.iter().filter(|b| matches(b)).cloned().collect();
        // Newest first; ids are monotonic so they break timestamp ties.
        filtered.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = filtered.len() as u64;
        let limit = query.limit.max(1);
        let page = query.page.max(1);
        let pages = (total + limit - 1) / limit;
        let data = filtered
            .into_iter()
            .skip(((page - 1) * limit) as usize)
            .take(limit as usize)
            .collect();
        Page {
            data,
            total,
            page,
            pages,
        }
    }
}

/// Full reference dataset, the input of `MemoryReferenceStore`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceData {
    pub departments: Vec<Department>,
    pub provinces: Vec<Province>,
    pub municipalities: Vec<Municipality>,
    pub electoral_seats: Vec<ElectoralSeat>,
    pub electoral_locations: Vec<ElectoralLocation>,
    pub electoral_tables: Vec<ElectoralTable>,
    pub political_parties: Vec<PoliticalParty>,
}

/// In-memory reference store built from a loaded dataset.
#[derive(Debug, Clone, Default)]
pub struct MemoryReferenceStore {
    departments: HashMap<String, Department>,
    provinces: HashMap<String, Province>,
    municipalities: HashMap<String, Municipality>,
    seats: HashMap<String, ElectoralSeat>,
    locations: HashMap<String, ElectoralLocation>,
    tables: Vec<ElectoralTable>,
    table_codes: HashSet<String>,
    party_ids: HashSet<String>,
}

impl MemoryReferenceStore {
    pub fn new(data: ReferenceData) -> MemoryReferenceStore {
        MemoryReferenceStore {
            departments: data
                .departments
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
            provinces: data
                .provinces
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            municipalities: data
                .municipalities
                .into_iter()
                .map(|m| (m.id.clone(), m))
                .collect(),
            seats: data
                .electoral_seats
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect(),
            locations: data
                .electoral_locations
                .into_iter()
                .map(|l| (l.id.clone(), l))
                .collect(),
            table_codes: data
                .electoral_tables
                .iter()
                .map(|t| t.table_code.clone())
                .collect(),
            tables: data.electoral_tables,
            party_ids: data.political_parties.into_iter().map(|p| p.id).collect(),
        }
    }

    /// Department, province and municipality names for one location, or
    /// None when a hierarchy link is missing.
    fn geo_names(&self, location_id: &str) -> Option<(&str, &str, &str)> {
        let location = self.locations.get(location_id)?;
        let seat = self.seats.get(&location.electoral_seat_id)?;
        let municipality = self.municipalities.get(&seat.municipality_id)?;
        let province = self.provinces.get(&municipality.province_id)?;
        let department = self.departments.get(&province.department_id)?;
        Some((
            department.name.as_str(),
            province.name.as_str(),
            municipality.name.as_str(),
        ))
    }
}

impl ReferenceStore for MemoryReferenceStore {
    fn table_exists(&self, table_code: &str) -> bool {
        self.table_codes.contains(table_code)
    }

    fn count_tables(&self, filter: &ResultsFilter) -> u64 {
        if filter.department.is_none()
            && filter.province.is_none()
            && filter.municipality.is_none()
        {
            return self.tables.len() as u64;
        }
        self.tables
            .iter()
            .filter(|t| {
                match self.geo_names(&t.electoral_location_id) {
                    Some((department, province, municipality)) => {
                        filter.department.as_deref().map_or(true, |d| d == department)
                            && filter.province.as_deref().map_or(true, |p| p == province)
                            && filter
                                .municipality
                                .as_deref()
                                .map_or(true, |m| m == municipality)
                    }
                    // A table whose hierarchy cannot be resolved matches no
                    // geography filter.
                    None => false,
                }
            })
            .count() as u64
    }

    fn count_tables_for_location(&self, location_id: &str) -> u64 {
        self.tables
            .iter()
            .filter(|t| t.electoral_location_id == location_id)
            .count() as u64
    }

    fn location(&self, id: &str) -> Option<ElectoralLocation> {
        self.locations.get(id).cloned()
    }

    fn location_snapshot(&self, id: &str) -> Result<LocationSnapshot, StoreError> {
        let location = self
            .locations
            .get(id)
            .ok_or_else(|| StoreError::LocationNotFound(id.to_string()))?;
        let seat = self
            .seats
            .get(&location.electoral_seat_id)
            .ok_or_else(|| StoreError::LocationNotFound(location.electoral_seat_id.clone()))?;
        let municipality = self
            .municipalities
            .get(&seat.municipality_id)
            .ok_or_else(|| StoreError::LocationNotFound(seat.municipality_id.clone()))?;
        let province = self
            .provinces
            .get(&municipality.province_id)
            .ok_or_else(|| StoreError::LocationNotFound(municipality.province_id.clone()))?;
        let department = self
            .departments
            .get(&province.department_id)
            .ok_or_else(|| StoreError::LocationNotFound(province.department_id.clone()))?;
        Ok(LocationSnapshot {
            department: department.name.clone(),
            province: province.name.clone(),
            municipality: municipality.name.clone(),
            electoral_seat: seat.name.clone(),
            electoral_location_name: location.name.clone(),
            district: location.district.clone(),
            zone: location.zone.clone(),
            circunscripcion: location.circunscripcion.clone(),
        })
    }

    fn party_known(&self, party_id: &str) -> bool {
        self.party_ids.contains(party_id)
    }

    fn nearest_location(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_m: f64,
    ) -> Result<NearbyLocation, StoreError> {
        let here = Point::new(longitude, latitude);
        let best = self
            .locations
            .values()
            .filter(|l| l.active)
            .map(|l| {
                let there = Point::new(l.coordinates.longitude, l.coordinates.latitude);
                (l, Haversine.distance(here, there))
            })
            .filter(|(_, d)| *d <= max_distance_m)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((location, distance_m)) => Ok(NearbyLocation {
                location: location.clone(),
                distance_m,
            }),
            None => Err(StoreError::NoLocationInRadius(max_distance_m)),
        }
    }
}
