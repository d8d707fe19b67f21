//! Hardware address normalisation.

use thiserror::Error;

/// Shortest accepted address (Ethernet).
const MIN_OCTETS: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HwaddrError {
    #[error("empty hardware address")]
    Empty,

    #[error("malformed hardware address: {0}")]
    Malformed(String),
}

/// Normalise a hardware address to lower-case, colon-separated octets.
///
/// Accepts `-` as a separator since some firmware substitutes it in URLs.
pub fn normalize_hwaddr(raw: &str) -> Result<String, HwaddrError> {
    if raw.is_empty() {
        return Err(HwaddrError::Empty);
    }
    let normalized = raw.replace('-', ":").to_ascii_lowercase();
    let octets: Vec<&str> = normalized.split(':').collect();
    let well_formed = octets.len() >= MIN_OCTETS
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()));
    if !well_formed {
        return Err(HwaddrError::Malformed(raw.to_string()));
    }
    Ok(normalized)
}
