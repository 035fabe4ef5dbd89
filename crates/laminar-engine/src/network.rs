//! Declarative network description, loadable from JSON.
//!
//! ```json
//! {
//!   "dt": 0.1,
//!   "columns": [
//!     { "index": 0, "population": { "model": "conductance" },
//!       "layers": [ { "name": "L4", "n_units": 20 }, { "name": "L2/3", "n_units": 20 } ] }
//!   ],
//!   "rules": [
//!     { "sources": [[0, "L4"]], "target_col": 0, "target_layer": "L2/3", "weight": 2.0 }
//!   ],
//!   "plasticity": { "rule": { "kind": "spike_timing" } }
//! }
//! ```

use crate::column::{Column, ColumnSpec};
use crate::connections::CouplingRule;
use crate::plasticity::{PlasticityEngine, PlasticityRule};
use crate::simulator::NetworkSimulator;
use laminar_core::{LaminarError, Result, Time};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which coupling rules learn, and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlasticitySpec {
    pub rule: PlasticityRule,
    /// Indices into the rule list; every rule when absent
    #[serde(default)]
    pub rules: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default = "default_dt")]
    pub dt: Time,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub rules: Vec<CouplingRule>,
    #[serde(default)]
    pub plasticity: Option<PlasticitySpec>,
}

fn default_dt() -> Time {
    0.1
}

impl NetworkSpec {
    pub fn new(dt: Time) -> Self {
        Self {
            dt,
            columns: Vec::new(),
            rules: Vec::new(),
            plasticity: None,
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn rule(mut self, rule: CouplingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn plastic(mut self, rule: PlasticityRule, rules: Option<Vec<usize>>) -> Self {
        self.plasticity = Some(PlasticitySpec { rule, rules });
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LaminarError::Parse(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LaminarError::Parse(e.to_string()))
    }

    /// Total units across all layers
    pub fn n_units(&self) -> usize {
        self.columns
            .iter()
            .flat_map(|c| c.layers.iter().map(|l| l.n_units))
            .sum()
    }

    pub fn build(&self) -> Result<NetworkSimulator> {
        let columns = self
            .columns
            .iter()
            .map(|spec| Column::from_spec(spec, self.dt))
            .collect::<Result<Vec<_>>>()?;
        let simulator = NetworkSimulator::new(columns, self.rules.clone(), self.dt)?;
        match &self.plasticity {
            Some(p) => simulator.with_plasticity(PlasticityEngine::new(p.rule)?, p.rules.clone()),
            None => Ok(simulator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{PopulationKind, PopulationSpec};

    const CONFIG: &str = r#"{
        "dt": 0.1,
        "columns": [
            { "index": 0,
              "layers": [ { "name": "L4", "n_units": 10 }, { "name": "L2/3", "n_units": 6 } ] },
            { "index": 1,
              "population": { "model": "leaky_rate", "tau_a": 5.0, "gain": { "type": "identity" } },
              "layers": [ { "name": "L5", "n_units": 4 } ] }
        ],
        "rules": [
            { "sources": [[0, "L4"]], "target_col": 0, "target_layer": "L2/3", "weight": 2.0 },
            { "sources": [[0, "L2/3"]], "target_col": 1, "target_layer": "L5", "weight": 0.5 }
        ],
        "plasticity": { "rule": { "kind": "spike_timing" }, "rules": [0] }
    }"#;

    #[test]
    fn test_parse_and_build() {
        let spec = NetworkSpec::from_json(CONFIG).unwrap();
        assert_eq!(spec.columns.len(), 2);
        assert_eq!(spec.n_units(), 20);
        assert_eq!(spec.columns[0].population, PopulationSpec::default());

        let sim = spec.build().unwrap();
        assert_eq!(sim.connections().dimension(), 3);
        assert_eq!(sim.connections().get_weight(0, "L2/3", 1, "L5").unwrap(), 0.5);
        assert!(sim.plasticity().is_some());

        let l5 = sim.column(1).unwrap().layer("L5").unwrap();
        assert_eq!(l5.kind(), PopulationKind::RateBased);
    }

    #[test]
    fn test_json_roundtrip() {
        let spec = NetworkSpec::from_json(CONFIG).unwrap();
        let again = NetworkSpec::from_json(&spec.to_json().unwrap()).unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            NetworkSpec::from_json("{ \"columns\": 3 }"),
            Err(LaminarError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_plastic_rule_index() {
        let mut spec = NetworkSpec::from_json(CONFIG).unwrap();
        spec.plasticity = Some(PlasticitySpec {
            rule: PlasticityRule::default(),
            rules: Some(vec![5]),
        });
        assert!(matches!(spec.build(), Err(LaminarError::Configuration(_))));
    }

    #[test]
    fn test_repeated_plastic_rule_rejected() {
        let mut spec = NetworkSpec::from_json(CONFIG).unwrap();
        spec.plasticity = Some(PlasticitySpec {
            rule: PlasticityRule::default(),
            rules: Some(vec![0, 0]),
        });
        assert!(matches!(spec.build(), Err(LaminarError::Configuration(_))));

        spec.plasticity = Some(PlasticitySpec {
            rule: PlasticityRule::default(),
            rules: Some(vec![0]),
        });
        assert!(spec.build().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = NetworkSpec::load("/nonexistent/laminar/network.json").unwrap_err();
        assert!(matches!(err, LaminarError::Io(_)));
    }
}
