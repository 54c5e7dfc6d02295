//! Connector registry (C2) — auto-detects format family and dispatches
//! parsing to the declared or detected connector.

pub mod ammoseek;
pub mod common;
pub mod dialect;
pub mod fields;
pub mod generic;
pub mod gunengine;
pub mod impact;

use crate::classify::ParsedRecord;
use crate::errors::PipelineError;
use crate::models::FormatKind;
use std::collections::HashMap;

/// Declared-specificity order tried for GENERIC jobs before falling back
/// to the catch-all generic connector.
const AUTO_DETECT_ORDER: &[FormatKind] = &[
    FormatKind::GunengineV2,
    FormatKind::AmmoseekV1,
    FormatKind::Impact,
];

#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub groups: Vec<(&'static str, &'static [&'static str])>,
}

pub struct ParseOutcome {
    pub records: Vec<ParsedRecord>,
}

pub trait Connector: Send + Sync {
    fn can_handle(&self, bytes: &[u8]) -> bool;
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome, PipelineError>;
    fn format_type(&self) -> FormatKind;
    fn name(&self) -> &'static str;
    fn field_mapping(&self) -> FieldMapping;
}

pub struct ConnectorRegistry {
    connectors: HashMap<FormatKind, Box<dyn Connector>>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        let mut connectors: HashMap<FormatKind, Box<dyn Connector>> = HashMap::new();
        connectors.insert(FormatKind::Generic, Box::new(generic::GenericConnector));
        connectors.insert(FormatKind::AmmoseekV1, Box::new(ammoseek::AmmoseekConnector));
        connectors.insert(FormatKind::GunengineV2, Box::new(gunengine::GunengineConnector));
        connectors.insert(FormatKind::Impact, Box::new(impact::ImpactConnector));
        Self { connectors }
    }
}

impl ConnectorRegistry {
    /// Resolves the connector to use for a feed declared as `declared`,
    /// applying the auto-detect policy when `declared == GENERIC`.
    pub fn resolve(&self, declared: FormatKind, bytes: &[u8]) -> &dyn Connector {
        if declared != FormatKind::Generic {
            return self.connector(declared);
        }

        for candidate in AUTO_DETECT_ORDER {
            let connector = self.connector(*candidate);
            if connector.can_handle(bytes) {
                return connector;
            }
        }

        self.connector(FormatKind::Generic)
    }

    fn connector(&self, kind: FormatKind) -> &dyn Connector {
        self.connectors
            .get(&kind)
            .expect("registry is seeded with all FormatKind variants")
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_feed_falls_back_when_no_specific_connector_matches() {
        let registry = ConnectorRegistry::default();
        let bytes = br#"[{"title":"Widget","price":9.99,"upc":"012345678905"}]"#;
        let connector = registry.resolve(FormatKind::Generic, bytes);
        assert_eq!(connector.format_type(), FormatKind::Generic);
    }

    #[test]
    fn generic_feed_auto_detects_gunengine_marker() {
        let registry = ConnectorRegistry::default();
        let bytes =
            br#"[{"item_id":"1","manufacturer":"Federal","bullet_weight":"115","title":"t","price":1}]"#;
        let connector = registry.resolve(FormatKind::Generic, bytes);
        assert_eq!(connector.format_type(), FormatKind::GunengineV2);
    }

    #[test]
    fn declared_format_is_never_overridden_by_auto_detect() {
        let registry = ConnectorRegistry::default();
        let bytes = br#"[{"title":"Widget"}]"#;
        let connector = registry.resolve(FormatKind::Impact, bytes);
        assert_eq!(connector.format_type(), FormatKind::Impact);
    }
}
