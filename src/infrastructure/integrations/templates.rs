//! Declarative station template catalog
//!
//! Given (vendor, model), enrich the station's connectors with plug type,
//! rated power, and phase wiring, and prescribe OCPP configuration keys to
//! push after boot. Application is idempotent: a station already carrying
//! the matching template id is left untouched.

use crate::application::ports::{TemplateApplied, TemplateCatalog};
use crate::domain::{ChargingStation, CurrentType};

/// One catalog row
#[derive(Debug, Clone)]
pub struct StationTemplate {
    pub vendor: &'static str,
    /// Prefix match against the reported model
    pub model_prefix: &'static str,
    pub current_type: CurrentType,
    pub connector_type: &'static str,
    pub power_watts: f64,
    pub phases: u8,
    pub configuration_keys: &'static [(&'static str, &'static str)],
}

const DEFAULT_CONFIGURATION_KEYS: &[(&str, &str)] = &[
    ("MeterValueSampleInterval", "60"),
    ("ClockAlignedDataInterval", "0"),
    ("StopTransactionOnInvalidId", "true"),
];

const CATALOG: &[StationTemplate] = &[
    StationTemplate {
        vendor: "Schneider Electric",
        model_prefix: "EVlink",
        current_type: CurrentType::AC,
        connector_type: "Type2",
        power_watts: 22_080.0,
        phases: 3,
        configuration_keys: DEFAULT_CONFIGURATION_KEYS,
    },
    StationTemplate {
        vendor: "ABB",
        model_prefix: "Terra AC",
        current_type: CurrentType::AC,
        connector_type: "Type2",
        power_watts: 22_080.0,
        phases: 3,
        configuration_keys: DEFAULT_CONFIGURATION_KEYS,
    },
    StationTemplate {
        vendor: "ABB",
        model_prefix: "Terra 5",
        current_type: CurrentType::DC,
        connector_type: "CCS",
        power_watts: 50_000.0,
        phases: 1,
        configuration_keys: DEFAULT_CONFIGURATION_KEYS,
    },
    StationTemplate {
        vendor: "Keba",
        model_prefix: "KC-P30",
        current_type: CurrentType::AC,
        connector_type: "Type2",
        power_watts: 11_040.0,
        phases: 3,
        configuration_keys: DEFAULT_CONFIGURATION_KEYS,
    },
];

/// Catalog-backed template application
#[derive(Default)]
pub struct StaticTemplateCatalog;

impl StaticTemplateCatalog {
    pub fn new() -> Self {
        Self
    }

    fn lookup(vendor: &str, model: &str) -> Option<&'static StationTemplate> {
        CATALOG.iter().find(|t| {
            t.vendor.eq_ignore_ascii_case(vendor)
                && model
                    .to_ascii_lowercase()
                    .starts_with(&t.model_prefix.to_ascii_lowercase())
        })
    }
}

impl TemplateCatalog for StaticTemplateCatalog {
    fn apply(&self, station: &mut ChargingStation) -> TemplateApplied {
        let Some(template) = Self::lookup(&station.vendor, &station.model) else {
            return TemplateApplied::default();
        };

        let template_id = format!("{}/{}", template.vendor, template.model_prefix);
        let already_applied = station.template_id.as_deref() == Some(template_id.as_str());

        station.current_type = template.current_type;
        let mut connectors_updated = false;
        for connector in &mut station.connectors {
            if connector.connector_type.as_deref() != Some(template.connector_type)
                || connector.power_watts != template.power_watts
            {
                connector.connector_type = Some(template.connector_type.to_string());
                connector.power_watts = template.power_watts;
                connector.number_of_connected_phases = Some(template.phases);
                connectors_updated = true;
            }
        }

        if already_applied && !connectors_updated {
            return TemplateApplied {
                updated: false,
                ocpp_standard_updated: false,
                ocpp_vendor_updated: false,
                configuration_keys: Vec::new(),
            };
        }

        station.template_id = Some(template_id);
        TemplateApplied {
            updated: true,
            ocpp_standard_updated: !already_applied,
            ocpp_vendor_updated: false,
            configuration_keys: template
                .configuration_keys
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn applies_matching_template() {
        let mut station =
            ChargingStation::new("CS-001", "t1", "Schneider Electric", "EVlink City", Utc::now());
        station.ensure_connector(1);
        station.ensure_connector(2);

        let applied = StaticTemplateCatalog::new().apply(&mut station);
        assert!(applied.updated);
        assert!(applied.ocpp_standard_updated);
        assert!(!applied.configuration_keys.is_empty());
        let connector = station.connector(1).unwrap();
        assert_eq!(connector.connector_type.as_deref(), Some("Type2"));
        assert_eq!(connector.power_watts, 22_080.0);
        assert_eq!(connector.number_of_connected_phases, Some(3));
    }

    #[test]
    fn second_application_is_idempotent() {
        let catalog = StaticTemplateCatalog::new();
        let mut station =
            ChargingStation::new("CS-001", "t1", "ABB", "Terra AC W22", Utc::now());
        station.ensure_connector(1);

        assert!(catalog.apply(&mut station).updated);
        let second = catalog.apply(&mut station);
        assert!(!second.updated);
        assert!(second.configuration_keys.is_empty());
    }

    #[test]
    fn unknown_vendor_is_untouched() {
        let mut station =
            ChargingStation::new("CS-001", "t1", "Garage Corp", "Homebrew", Utc::now());
        station.ensure_connector(1);

        let applied = StaticTemplateCatalog::new().apply(&mut station);
        assert!(!applied.updated);
        assert!(station.template_id.is_none());
        assert_eq!(station.connector(1).unwrap().power_watts, 0.0);
    }

    #[test]
    fn dc_template_sets_current_type() {
        let mut station = ChargingStation::new("CS-001", "t1", "ABB", "Terra 54", Utc::now());
        station.ensure_connector(1);

        StaticTemplateCatalog::new().apply(&mut station);
        assert_eq!(station.current_type, CurrentType::DC);
        assert_eq!(
            station.connector(1).unwrap().connector_type.as_deref(),
            Some("CCS")
        );
    }
}
