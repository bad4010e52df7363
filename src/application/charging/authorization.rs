//! Tag authorization resolution
//!
//! Lookup order: local tag store first, then remote (roaming) authorization
//! when the tenant has a roaming bridge enabled. Site-area authorization
//! rules live in the external authorization component; the core consumes the
//! outcome as a predicate.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::application::normalizer::IdTagStatus;
use crate::application::ports::{RoamingPort, SiteAuthorizationPort, Storage};
use crate::domain::token::MAX_TAG_LENGTH;
use crate::domain::{ChargingStation, Tenant, User, UserStatus};

/// Outcome of resolving an idTag
#[derive(Debug)]
pub struct Authorization {
    pub status: IdTagStatus,
    pub user: Option<User>,
    /// Set when a roaming platform authorized the tag
    pub roaming_authorization_id: Option<String>,
}

impl Authorization {
    fn denied(status: IdTagStatus) -> Self {
        Self {
            status,
            user: None,
            roaming_authorization_id: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == IdTagStatus::Accepted
    }
}

/// Resolve an idTag for starting a session: the plain resolution plus the
/// site-area assignment predicate. A tag that is valid but not assigned to
/// charge on this station comes back `Invalid`. Roaming tags are exempt;
/// the roaming platform already authorized them and the public-station rule
/// applies instead.
#[allow(clippy::too_many_arguments)]
pub async fn resolve_for_start(
    storage: &dyn Storage,
    roaming: &dyn RoamingPort,
    site_authorization: &dyn SiteAuthorizationPort,
    tenant: &Tenant,
    station: &ChargingStation,
    tag_id: &str,
    now: DateTime<Utc>,
) -> Authorization {
    let authorization = resolve(storage, roaming, tenant, station, tag_id, now).await;
    if !authorization.is_accepted() || authorization.roaming_authorization_id.is_some() {
        return authorization;
    }

    match site_authorization
        .authorizes_start(tenant, station, tag_id)
        .await
    {
        Ok(true) => authorization,
        Ok(false) => {
            debug!(
                charge_box_id = station.id.as_str(),
                tag_id, "Tag rejected by site policy"
            );
            Authorization::denied(IdTagStatus::Invalid)
        }
        // Authorization at start is inline-critical; an unreachable policy
        // component denies rather than waving the tag through
        Err(e) => {
            warn!(
                charge_box_id = station.id.as_str(),
                tag_id,
                error = %e,
                "Site authorization check failed, denying"
            );
            Authorization::denied(IdTagStatus::Invalid)
        }
    }
}

/// Resolve an idTag against the local tag store and the roaming bridge.
pub async fn resolve(
    storage: &dyn Storage,
    roaming: &dyn RoamingPort,
    tenant: &Tenant,
    station: &ChargingStation,
    tag_id: &str,
    now: DateTime<Utc>,
) -> Authorization {
    let tag_id = tag_id.trim();
    if tag_id.is_empty() {
        return Authorization::denied(IdTagStatus::Invalid);
    }
    if tag_id.len() > MAX_TAG_LENGTH {
        warn!(
            charge_box_id = station.id.as_str(),
            tag_length = tag_id.len(),
            "idTag exceeds the OCPP 20-byte limit"
        );
        return Authorization::denied(IdTagStatus::Invalid);
    }

    match storage.get_tag(&tenant.id, tag_id).await {
        Ok(Some(tag)) => {
            if tag.is_expired(now) {
                return Authorization::denied(IdTagStatus::Expired);
            }
            if !tag.active {
                return Authorization::denied(IdTagStatus::Blocked);
            }
            let user = match &tag.user_id {
                Some(user_id) => match storage.get_user(&tenant.id, user_id).await {
                    Ok(user) => user,
                    Err(e) => {
                        warn!(tag_id, error = %e, "User lookup failed during authorization");
                        None
                    }
                },
                None => None,
            };
            match user {
                Some(user) if user.status == UserStatus::Blocked => {
                    Authorization::denied(IdTagStatus::Blocked)
                }
                Some(user) => Authorization {
                    status: IdTagStatus::Accepted,
                    user: Some(user),
                    roaming_authorization_id: None,
                },
                None => Authorization::denied(IdTagStatus::Invalid),
            }
        }
        Ok(None) => resolve_roaming(roaming, tenant, station, tag_id).await,
        Err(e) => {
            warn!(tag_id, error = %e, "Tag lookup failed during authorization");
            Authorization::denied(IdTagStatus::Invalid)
        }
    }
}

async fn resolve_roaming(
    roaming: &dyn RoamingPort,
    tenant: &Tenant,
    station: &ChargingStation,
    tag_id: &str,
) -> Authorization {
    if tenant.active_roaming_protocol().is_none() {
        return Authorization::denied(IdTagStatus::Invalid);
    }
    match roaming.authorize(tenant, tag_id).await {
        Ok(Some(authorization_id)) => {
            if !station.public {
                debug!(
                    charge_box_id = station.id.as_str(),
                    tag_id, "Roaming tag rejected on non-public station"
                );
                return Authorization::denied(IdTagStatus::Invalid);
            }
            Authorization {
                status: IdTagStatus::Accepted,
                user: None,
                roaming_authorization_id: Some(authorization_id),
            }
        }
        Ok(None) => Authorization::denied(IdTagStatus::Invalid),
        Err(e) => {
            warn!(tag_id, error = %e, "Remote authorization failed");
            Authorization::denied(IdTagStatus::Invalid)
        }
    }
}
