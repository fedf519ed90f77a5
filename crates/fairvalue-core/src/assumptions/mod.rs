//! Immutable configuration consumed by every valuation component.
//!
//! An [`AssumptionSet`] is built once (from the built-in tables or a JSON
//! document) and passed by reference; nothing in the engine mutates it.

pub mod region;
pub mod sector;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FairValueError;
use crate::FairValueResult;

pub use region::{CoverageTier, CreditRating, DebtRatioBucket, RegionAssumptions};
pub use sector::{SectorCategory, SectorProfile};

/// Region and sector tables keyed by region name and sector category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssumptionSet {
    pub regions: BTreeMap<String, RegionAssumptions>,
    #[serde(default)]
    pub sectors: BTreeMap<SectorCategory, SectorProfile>,
    #[serde(default = "SectorProfile::fallback")]
    pub default_sector: SectorProfile,
}

impl AssumptionSet {
    /// Indonesia and US regions with the built-in sector profiles.
    pub fn builtin() -> Self {
        let mut regions = BTreeMap::new();
        regions.insert("Indonesia".to_string(), RegionAssumptions::indonesia());
        regions.insert("US".to_string(), RegionAssumptions::united_states());

        let sectors = SectorCategory::all()
            .iter()
            .filter(|c| **c != SectorCategory::Unclassified)
            .map(|c| (*c, SectorProfile::for_category(*c)))
            .collect();

        AssumptionSet {
            regions,
            sectors,
            default_sector: SectorProfile::fallback(),
        }
    }

    /// Parse and validate an assumption set from JSON.
    pub fn from_json_str(json: &str) -> FairValueResult<Self> {
        let set: AssumptionSet = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> FairValueResult<()> {
        if self.regions.is_empty() {
            return Err(FairValueError::InvalidConfiguration(
                "at least one region is required".into(),
            ));
        }
        for (name, region) in &self.regions {
            region.validate(name)?;
        }
        for (category, profile) in &self.sectors {
            profile.validate(category.name())?;
        }
        self.default_sector.validate("default sector")
    }

    /// Look up a region. An unknown key is a caller contract violation.
    pub fn region(&self, name: &str) -> FairValueResult<&RegionAssumptions> {
        if let Some(r) = self.regions.get(name) {
            return Ok(r);
        }
        self.regions
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name.trim()))
            .map(|(_, r)| r)
            .ok_or_else(|| FairValueError::UnknownRegion(name.to_string()))
    }

    /// Sector profile, falling back to the default profile for unlisted categories.
    pub fn sector(&self, category: SectorCategory) -> &SectorProfile {
        self.sectors.get(&category).unwrap_or(&self.default_sector)
    }

    pub fn region_names(&self) -> Vec<&str> {
        self.regions.keys().map(String::as_str).collect()
    }
}

impl Default for AssumptionSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_builtin_regions() {
        let set = AssumptionSet::builtin();
        assert_eq!(set.region_names(), vec!["Indonesia", "US"]);
        let idn = set.region("Indonesia").unwrap();
        assert_eq!(idn.risk_free_rate, dec!(0.0665));
        assert_eq!(idn.terminal_growth, dec!(0.040));
        let us = set.region("us").unwrap();
        assert_eq!(us.tax_rate, dec!(0.21));
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_unknown_region_is_error() {
        let set = AssumptionSet::builtin();
        match set.region("Atlantis") {
            Err(FairValueError::UnknownRegion(r)) => assert_eq!(r, "Atlantis"),
            other => panic!("Expected UnknownRegion, got {other:?}"),
        }
    }

    #[test]
    fn test_unlisted_sector_uses_default() {
        let mut set = AssumptionSet::builtin();
        set.sectors.remove(&SectorCategory::Energy);
        assert_eq!(
            set.sector(SectorCategory::Energy).typical_fcf_yield,
            set.default_sector.typical_fcf_yield
        );
    }

    #[test]
    fn test_json_roundtrip_adds_region() {
        let mut set = AssumptionSet::builtin();
        let mut sg = RegionAssumptions::united_states();
        sg.risk_free_rate = dec!(0.031);
        set.regions.insert("Singapore".into(), sg);
        let json = serde_json::to_string(&set).unwrap();

        let loaded = AssumptionSet::from_json_str(&json).unwrap();
        assert_eq!(loaded.region("Singapore").unwrap().risk_free_rate, dec!(0.031));
        assert_eq!(loaded.sectors.len(), set.sectors.len());
    }

    #[test]
    fn test_empty_regions_rejected() {
        let json = r#"{"regions": {}}"#;
        assert!(matches!(
            AssumptionSet::from_json_str(json),
            Err(FairValueError::InvalidConfiguration(_))
        ));
    }
}
