/*
[INPUT]:  Caller-supplied bearer tokens and the custody JWT endpoint
[OUTPUT]: Wallet id and user info from a validated token exchange
[POS]:    Embedded layer - the non-interactive user-wallet auth strategy
[UPDATE]: When token validation rules or the exchange contract change
*/

use tracing::{debug, info};

use crate::custody::{CustodyClient, JwtExchange};
use crate::error::{ConnectError, Result};

/// Syntactic token check performed before any network call: non-empty, three
/// dot-separated non-empty segments. Signature verification belongs to the
/// custody service.
pub fn validate_jwt_shape(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(ConnectError::Jwt("JWT token is required".to_string()));
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(ConnectError::Jwt(
            "JWT token must have three dot-separated segments".to_string(),
        ));
    }
    Ok(())
}

/// Exchange a bearer token for a custody wallet
pub async fn authenticate_jwt(
    custody: &CustodyClient,
    token: &str,
    organization_id: &str,
    parent_organization_id: &str,
) -> Result<JwtExchange> {
    validate_jwt_shape(token)?;
    debug!(organization_id, "exchanging JWT for wallet");
    let exchange = custody
        .exchange_jwt(token, organization_id, parent_organization_id)
        .await?;
    info!(wallet_id = %exchange.wallet_id, "JWT exchange succeeded");
    Ok(exchange)
}
