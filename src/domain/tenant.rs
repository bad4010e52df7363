//! Tenant entity, the isolation boundary for every other record

use serde::{Deserialize, Serialize};

use super::transaction::RoamingProtocol;

/// Feature switches per tenant
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TenantFeatures {
    pub pricing: bool,
    pub billing: bool,
    pub car: bool,
    pub smart_charging: bool,
    pub ocpi: bool,
    pub oicp: bool,
}

/// Tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub subdomain: String,
    pub features: TenantFeatures,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            subdomain: name.to_lowercase(),
            name,
            features: TenantFeatures::default(),
        }
    }

    /// The single active roaming protocol, if any. OCPI wins when a tenant
    /// has both enabled (they are mutually exclusive in practice).
    pub fn active_roaming_protocol(&self) -> Option<RoamingProtocol> {
        if self.features.ocpi {
            Some(RoamingProtocol::Ocpi)
        } else if self.features.oicp {
            Some(RoamingProtocol::Oicp)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roaming_protocol_selection() {
        let mut tenant = Tenant::new("t1", "Acme");
        assert_eq!(tenant.active_roaming_protocol(), None);

        tenant.features.oicp = true;
        assert_eq!(tenant.active_roaming_protocol(), Some(RoamingProtocol::Oicp));

        tenant.features.ocpi = true;
        assert_eq!(tenant.active_roaming_protocol(), Some(RoamingProtocol::Ocpi));
    }
}
