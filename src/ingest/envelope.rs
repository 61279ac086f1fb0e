//! The artifact envelope: an OpenSea-style metadata document whose
//! attribute list carries one entry with an embedded ballot payload.

use serde::Deserialize;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use crate::ingest::{IngestResult, SchemaSnafu};

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactEnvelope {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<EnvelopeAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeAttribute {
    #[serde(default)]
    pub trait_type: Option<String>,
    #[serde(default)]
    pub value: Option<JSValue>,
    /// Set on exactly one attribute: the embedded ballot payload.
    #[serde(default)]
    pub data: Option<BallotPayload>,
}

/// The ballot data as found inside the artifact, before validation.
/// Counts are signed so that negative inputs reach the validator instead of
/// failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct BallotPayload {
    #[serde(rename = "tableCode", default)]
    pub table_code: String,
    #[serde(rename = "tableNumber", default)]
    pub table_number: String,
    #[serde(rename = "locationId", default)]
    pub location_id: String,
    #[serde(default)]
    pub votes: Option<VotesPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VotesPayload {
    #[serde(rename = "validVotes", default)]
    pub valid_votes: i64,
    #[serde(rename = "nullVotes", default)]
    pub null_votes: i64,
    #[serde(rename = "blankVotes", default)]
    pub blank_votes: i64,
    /// Present in some artifacts; ignored, the total is always recomputed.
    #[serde(rename = "totalVotes", default)]
    pub total_votes: Option<i64>,
    #[serde(rename = "partyVotes", default)]
    pub party_votes: Vec<PartyVotePayload>,
    #[serde(rename = "deputyVotes", default)]
    pub deputy_votes: Vec<PartyVotePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartyVotePayload {
    #[serde(rename = "partyId")]
    pub party_id: String,
    pub votes: i64,
}

/// Locates the single envelope attribute carrying ballot data.
pub fn extract_ballot_payload(doc: &JSValue) -> IngestResult<BallotPayload> {
    let envelope: ArtifactEnvelope = serde_json::from_value(doc.clone())
        .map_err(|e| {
            SchemaSnafu {
                message: format!("not a metadata envelope: {}", e),
            }
            .build()
        })?;
    envelope
        .attributes
        .into_iter()
        .find_map(|attr| attr.data)
        .context(SchemaSnafu {
            message: "no envelope attribute carries ballot data",
        })
}
