//! Content-identifier extraction from the artifact URI.

use regex::Regex;

use crate::ingest::{IngestResult, MalformedUriSnafu};

/// The known URI shapes, tried in order: the public gateways first, then a
/// bare CIDv0 (`Qm` + 44 base58 characters), then a long CIDv1.
const CID_PATTERNS: [&str; 4] = [
    r"ipfs\.io/ipfs/([A-Za-z0-9]+)",
    r"gateway\.pinata\.cloud/ipfs/([A-Za-z0-9]+)",
    r"(Qm[A-Za-z0-9]{44})",
    r"([a-zA-Z0-9]{46,})",
];

pub fn extract_cid(uri: &str) -> IngestResult<String> {
    for pattern in CID_PATTERNS {
        let re = Regex::new(pattern).expect("hardcoded CID pattern");
        if let Some(captures) = re.captures(uri) {
            if let Some(m) = captures.get(1) {
                return Ok(m.as_str().to_string());
            }
        }
    }
    MalformedUriSnafu { uri }.fail()
}
