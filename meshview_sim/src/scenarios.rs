//! Fault-injection scenarios for the refresh pipeline.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Healthy feed, every tick publishes
    Nominal,

    /// SIM-002: Feed outage, last good graph stays visible
    Outage,

    /// SIM-003: Fetch exceeds its timeout and is abandoned
    SlowFetch,

    /// SIM-004: Malformed entries and an empty batch
    MalformedFeed,

    /// SIM-005: Link across the ±180° meridian, planar vs haversine
    SeamCrossing,

    /// SIM-006: H3-indexed builder against all pairs
    IndexParity,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Nominal,
            ScenarioId::Outage,
            ScenarioId::SlowFetch,
            ScenarioId::MalformedFeed,
            ScenarioId::SeamCrossing,
            ScenarioId::IndexParity,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Nominal => "nominal",
            ScenarioId::Outage => "outage",
            ScenarioId::SlowFetch => "slow_fetch",
            ScenarioId::MalformedFeed => "malformed_feed",
            ScenarioId::SeamCrossing => "seam_crossing",
            ScenarioId::IndexParity => "index_parity",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Nominal => "Walker shell, healthy feed, graph published every tick",
            ScenarioId::Outage => "Two failed fetches mid-run, previous graph retained, then recovery",
            ScenarioId::SlowFetch => "20s fetch against an 8s timeout, abandoned without publishing",
            ScenarioId::MalformedFeed => "Random entries dropped as malformed, plus one empty batch",
            ScenarioId::SeamCrossing => "Pair straddling the antimeridian linked only under haversine",
            ScenarioId::IndexParity => "Dense shell, H3 candidate index must equal all pairs every tick",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nominal" | "sim-001" => Ok(ScenarioId::Nominal),
            "outage" | "sim-002" => Ok(ScenarioId::Outage),
            "slow_fetch" | "slowfetch" | "sim-003" => Ok(ScenarioId::SlowFetch),
            "malformed_feed" | "malformed" | "sim-004" => Ok(ScenarioId::MalformedFeed),
            "seam_crossing" | "seam" | "sim-005" => Ok(ScenarioId::SeamCrossing),
            "index_parity" | "parity" | "sim-006" => Ok(ScenarioId::IndexParity),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("SIM-003".parse::<ScenarioId>(), Ok(ScenarioId::SlowFetch));
        assert_eq!("seam".parse::<ScenarioId>(), Ok(ScenarioId::SeamCrossing));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
