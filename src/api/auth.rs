//! Static bearer-token authentication

use crate::observability::metrics::metrics;
use std::sync::Arc;
use tracing::warn;
use warp::{Filter, Rejection};

/// Rejection for a missing or mismatching bearer token
#[derive(Debug)]
pub struct Unauthorized;

impl warp::reject::Reject for Unauthorized {}

/// Filter that passes only requests carrying `Authorization: Bearer <token>`
///
/// Must sit before any body filter so rejected requests are never parsed.
pub fn bearer(token: Arc<str>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let token = token.clone();
            async move {
                let presented = header.as_deref().and_then(parse_bearer);
                match presented {
                    Some(presented) if tokens_match(presented, &token) => Ok(()),
                    _ => {
                        metrics().record_unauthorized();
                        warn!(
                            header_present = header.is_some(),
                            "Rejected request with invalid bearer token"
                        );
                        Err(warp::reject::custom(Unauthorized))
                    }
                }
            }
        })
        .untuple_one()
}

/// Extract the credentials from a `Bearer` authorization header
fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, credentials) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let credentials = credentials.trim();
    (!credentials.is_empty()).then_some(credentials)
}

/// Compare without short-circuiting on the first differing byte
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
