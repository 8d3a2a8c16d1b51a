//! Delivery zone model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use geomarket_core::{Coverage, Polygon, ZoneId};

/// An operator-defined delivery polygon.
#[derive(Debug, Clone, Serialize)]
pub struct Zone {
    pub id: ZoneId,
    /// Default display name.
    pub name: String,
    /// Display names keyed by lowercase language code.
    pub translations: BTreeMap<String, String>,
    pub polygon: Polygon,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    /// Display name in `lang`, falling back to the default name.
    ///
    /// Region subtags are ignored when there is no exact match, so `fr-CA`
    /// finds a `fr` translation.
    #[must_use]
    pub fn display_name(&self, lang: &str) -> &str {
        let lang = lang.to_lowercase();
        self.translations
            .get(&lang)
            .or_else(|| {
                lang.split(['-', '_'])
                    .next()
                    .and_then(|primary| self.translations.get(primary))
            })
            .map_or(self.name.as_str(), String::as_str)
    }
}

impl Coverage for Zone {
    fn zone_id(&self) -> ZoneId {
        self.id
    }

    fn polygon(&self) -> &Polygon {
        &self.polygon
    }
}
