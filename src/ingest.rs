//! The ballot ingestion pipeline: fetch an artifact, extract its content
//! identifier and embedded ballot payload, validate everything at once,
//! denormalize the location hierarchy and persist exactly once per table
//! code.

use log::{debug, info};
use snafu::{prelude::*, Snafu};

use ballot_tally::{
    BallotDraft, BallotStatus, BallotStore, PartyVote, ReferenceStore, StoreError, VoteTotals,
};

pub mod cid;
pub mod envelope;
pub mod fetch;

use crate::ingest::envelope::{extract_ballot_payload, BallotPayload, VotesPayload};
use crate::ingest::fetch::ArtifactFetcher;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    /// Network failure, timeout or a non-parseable artifact document.
    #[snafu(display("Failed to fetch artifact {uri}: {message}"))]
    Fetch { uri: String, message: String },

    #[snafu(display("Could not extract a content identifier from URI {uri}"))]
    MalformedUri { uri: String },

    #[snafu(display("Invalid artifact format: {message}"))]
    Schema { message: String },

    #[snafu(display("Ballot validation failed: {}", messages.join("; ")))]
    Validation { messages: Vec<String> },

    #[snafu(display("A ballot was already registered for table {table_code}"))]
    Conflict { table_code: String },

    #[snafu(display("Electoral location {location_id} not found"))]
    LocationNotFound { location_id: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    /// Only fetch failures are worth retrying. Every other kind reports a
    /// terminal problem with the artifact, its payload or its target table;
    /// in particular a Conflict means the table is already registered and
    /// the same artifact must not be resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Fetch { .. })
    }
}

/// Runs the whole pipeline for one artifact URI. Each stage fails
/// independently; nothing is persisted unless every stage succeeds.
pub fn ingest_from_uri(
    uri: &str,
    fetcher: &dyn ArtifactFetcher,
    ballots: &mut dyn BallotStore,
    reference: &dyn ReferenceStore,
) -> IngestResult<ballot_tally::Ballot> {
    info!("Ingesting ballot artifact {}", uri);
    let doc = fetcher.fetch(uri)?;
    let cid = cid::extract_cid(uri)?;
    let payload = extract_ballot_payload(&doc)?;
    debug!("Extracted payload for table {:?}", payload.table_code);

    let votes = validate_payload(&payload, reference)?;

    let location_id = payload.location_id.clone();
    let snapshot = match reference.location_snapshot(&location_id) {
        Ok(s) => s,
        Err(_) => return LocationNotFoundSnafu { location_id }.fail(),
    };

    let draft = BallotDraft {
        table_code: payload.table_code.clone(),
        table_number: payload.table_number.clone(),
        electoral_location_id: location_id,
        location: snapshot,
        votes,
        ipfs_uri: uri.to_string(),
        ipfs_cid: cid,
        status: BallotStatus::Processed,
    };
    match ballots.insert(draft) {
        Ok(ballot) => {
            info!(
                "Registered ballot {} for table {}",
                ballot.id, ballot.table_code
            );
            Ok(ballot)
        }
        Err(StoreError::DuplicateTableCode(table_code)) => ConflictSnafu { table_code }.fail(),
        Err(e) => whatever!("Storage rejected the ballot: {}", e),
    }
}

/// Checks the payload against the reference data, accumulating every
/// violation into one report instead of failing on the first. On success
/// returns the model vote totals, recomputed and safely non-negative.
fn validate_payload(
    payload: &BallotPayload,
    reference: &dyn ReferenceStore,
) -> IngestResult<VoteTotals> {
    let mut errors: Vec<String> = Vec::new();

    if payload.table_code.trim().is_empty()
        || payload.table_number.trim().is_empty()
        || payload.location_id.trim().is_empty()
    {
        errors.push(
            "incomplete table identification: tableCode, tableNumber and locationId are required"
                .to_string(),
        );
    }

    if !payload.table_code.trim().is_empty() && !reference.table_exists(&payload.table_code) {
        errors.push(format!(
            "table code '{}' does not exist",
            payload.table_code
        ));
    }

    match &payload.votes {
        None => errors.push("votes data missing".to_string()),
        Some(votes) => {
            let mut unknown_seen: std::collections::HashSet<&str> =
                std::collections::HashSet::new();
            for pv in votes.party_votes.iter().chain(votes.deputy_votes.iter()) {
                if !reference.party_known(&pv.party_id) && unknown_seen.insert(&pv.party_id) {
                    errors.push(format!("unknown political party '{}'", pv.party_id));
                }
            }

            let party_sum: i64 = votes.party_votes.iter().map(|pv| pv.votes).sum();
            if party_sum != votes.valid_votes {
                errors.push(format!(
                    "party votes add up to {} but valid votes are {}",
                    party_sum, votes.valid_votes
                ));
            }

            let negative = votes.valid_votes < 0
                || votes.null_votes < 0
                || votes.blank_votes < 0
                || votes
                    .party_votes
                    .iter()
                    .chain(votes.deputy_votes.iter())
                    .any(|pv| pv.votes < 0);
            if negative {
                errors.push("vote counts may not be negative".to_string());
            }
        }
    }

    ensure!(errors.is_empty(), ValidationSnafu { messages: errors });

    // The missing-votes case was recorded above and stopped at the ensure.
    let votes = payload.votes.clone().unwrap_or_default();
    Ok(to_vote_totals(&votes))
}

fn to_vote_totals(votes: &VotesPayload) -> VoteTotals {
    let to_party_votes = |list: &[envelope::PartyVotePayload]| -> Vec<PartyVote> {
        list.iter()
            .map(|pv| PartyVote {
                party_id: pv.party_id.clone(),
                votes: pv.votes as u64,
            })
            .collect()
    };
    let mut totals = VoteTotals {
        valid_votes: votes.valid_votes as u64,
        null_votes: votes.null_votes as u64,
        blank_votes: votes.blank_votes as u64,
        // The artifact-supplied total is never trusted.
        total_votes: 0,
        party_votes: to_party_votes(&votes.party_votes),
        deputy_votes: to_party_votes(&votes.deputy_votes),
    };
    totals.recompute_total();
    totals
}
