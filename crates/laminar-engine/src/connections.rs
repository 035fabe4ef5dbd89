//! Inter-layer coupling: rules, the layer index, and the weight matrix.
//!
//! Every layer of every column gets a stable matrix index, assigned by
//! walking columns in order and each column's layers in declaration order.
//! `weights[[target, source]]` holds the coupling strength from `source`
//! onto `target`.

use crate::column::Column;
use laminar_core::{LaminarError, Result, SynapseChannel, Weight};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a rule's sources are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingKind {
    /// Each source contributes w_j * c_j
    #[default]
    Additive,
    /// w * product of source contributions
    Multiplicative,
    /// Declared but not supported; rejected at construction
    Divisive,
}

/// Declarative coupling rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingRule {
    /// (column index, layer name) pairs
    pub sources: Vec<(usize, String)>,
    pub target_col: usize,
    pub target_layer: String,
    #[serde(default, alias = "type")]
    pub combine: CouplingKind,
    #[serde(default = "default_weight")]
    pub weight: Weight,
    #[serde(default, alias = "synapse_type")]
    pub synapse_channel: SynapseChannel,
}

fn default_weight() -> Weight {
    1.0
}

impl CouplingRule {
    pub fn new(
        combine: CouplingKind,
        sources: &[(usize, &str)],
        target: (usize, &str),
        weight: Weight,
    ) -> Self {
        Self {
            sources: sources
                .iter()
                .map(|(col, layer)| (*col, layer.to_string()))
                .collect(),
            target_col: target.0,
            target_layer: target.1.to_string(),
            combine,
            weight,
            synapse_channel: SynapseChannel::Additive,
        }
    }

    pub fn additive(sources: &[(usize, &str)], target: (usize, &str), weight: Weight) -> Self {
        Self::new(CouplingKind::Additive, sources, target, weight)
    }

    pub fn multiplicative(
        sources: &[(usize, &str)],
        target: (usize, &str),
        weight: Weight,
    ) -> Self {
        Self::new(CouplingKind::Multiplicative, sources, target, weight)
    }

    pub fn on_channel(mut self, channel: SynapseChannel) -> Self {
        self.synapse_channel = channel;
        self
    }
}

/// A rule with layer names resolved to matrix indices
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    pub sources: Vec<usize>,
    pub target: usize,
    pub combine: CouplingKind,
    pub channel: SynapseChannel,
}

impl ResolvedRule {
    /// (source, target) pairs whose weights the rule reads
    pub fn weighted_pairs(&self) -> Vec<(usize, usize)> {
        match self.combine {
            CouplingKind::Additive => self.sources.iter().map(|&s| (s, self.target)).collect(),
            CouplingKind::Multiplicative => self
                .sources
                .first()
                .map(|&s| vec![(s, self.target)])
                .unwrap_or_default(),
            CouplingKind::Divisive => Vec::new(),
        }
    }
}

/// Owns the coupling rules and the mutable weight matrix
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    rules: Vec<CouplingRule>,
    resolved: Vec<ResolvedRule>,
    index: HashMap<(usize, String), usize>,
    addresses: Vec<(usize, String)>,
    weights: Array2<Weight>,
    history: Vec<Array2<Weight>>,
}

impl ConnectionManager {
    pub fn new(columns: &[Column], rules: Vec<CouplingRule>) -> Result<Self> {
        let mut index = HashMap::new();
        let mut addresses = Vec::new();
        for column in columns {
            if addresses.iter().any(|(c, _)| *c == column.index()) {
                return Err(LaminarError::Configuration(format!(
                    "duplicate column index {}",
                    column.index()
                )));
            }
            for name in column.layer_names() {
                index.insert((column.index(), name.to_string()), addresses.len());
                addresses.push((column.index(), name.to_string()));
            }
        }

        let n = addresses.len();
        let mut weights = Array2::zeros((n, n));
        let mut resolved = Vec::with_capacity(rules.len());

        for (i, rule) in rules.iter().enumerate() {
            if rule.combine == CouplingKind::Divisive {
                return Err(LaminarError::Configuration(format!(
                    "rule {}: divisive coupling is not supported",
                    i
                )));
            }
            if rule.sources.is_empty() {
                return Err(LaminarError::Configuration(format!(
                    "rule {}: no source layers",
                    i
                )));
            }

            let resolve = |col: usize, layer: &str| {
                index.get(&(col, layer.to_string())).copied().ok_or_else(|| {
                    LaminarError::Configuration(format!(
                        "rule {}: unknown layer '{}' in column {}",
                        i, layer, col
                    ))
                })
            };
            let target = resolve(rule.target_col, &rule.target_layer)?;
            let sources = rule
                .sources
                .iter()
                .map(|(col, layer)| resolve(*col, layer))
                .collect::<Result<Vec<_>>>()?;

            let accepts = columns
                .iter()
                .find(|c| c.index() == rule.target_col)
                .and_then(|c| c.layer(&rule.target_layer))
                .map(|p| p.accepts(rule.synapse_channel))
                .unwrap_or(false);
            if !accepts {
                return Err(LaminarError::Configuration(format!(
                    "rule {}: layer '{}' in column {} does not accept channel '{}'",
                    i, rule.target_layer, rule.target_col, rule.synapse_channel
                )));
            }

            // Later rules overwrite shared (target, source) entries
            for &s in &sources {
                weights[[target, s]] = rule.weight;
            }
            resolved.push(ResolvedRule {
                sources,
                target,
                combine: rule.combine,
                channel: rule.synapse_channel,
            });
        }

        log::debug!(
            "connection manager: {} layers, {} rules",
            n,
            resolved.len()
        );

        Ok(Self {
            rules,
            resolved,
            index,
            addresses,
            weights,
            history: Vec::new(),
        })
    }

    /// Number of layers across all columns
    pub fn dimension(&self) -> usize {
        self.addresses.len()
    }

    pub fn rules(&self) -> &[CouplingRule] {
        &self.rules
    }

    pub fn resolved_rules(&self) -> &[ResolvedRule] {
        &self.resolved
    }

    pub fn index_of(&self, column: usize, layer: &str) -> Option<usize> {
        self.index.get(&(column, layer.to_string())).copied()
    }

    pub fn address_of(&self, index: usize) -> Option<(usize, &str)> {
        self.addresses
            .get(index)
            .map(|(col, layer)| (*col, layer.as_str()))
    }

    pub fn weights(&self) -> &Array2<Weight> {
        &self.weights
    }

    /// Weight by matrix index (target row, source column)
    pub fn weight_at(&self, source: usize, target: usize) -> Weight {
        self.weights[[target, source]]
    }

    fn lookup(&self, column: usize, layer: &str) -> Result<usize> {
        self.index_of(column, layer)
            .ok_or_else(|| LaminarError::Lookup {
                column,
                layer: layer.to_string(),
            })
    }

    pub fn get_weight(
        &self,
        source_col: usize,
        source_layer: &str,
        target_col: usize,
        target_layer: &str,
    ) -> Result<Weight> {
        let s = self.lookup(source_col, source_layer)?;
        let t = self.lookup(target_col, target_layer)?;
        Ok(self.weights[[t, s]])
    }

    /// Set a weight directly. No clamping is applied.
    pub fn update_weight(
        &mut self,
        source_col: usize,
        source_layer: &str,
        target_col: usize,
        target_layer: &str,
        weight: Weight,
    ) -> Result<()> {
        let s = self.lookup(source_col, source_layer)?;
        let t = self.lookup(target_col, target_layer)?;
        self.weights[[t, s]] = weight;
        Ok(())
    }

    /// Add `dw` and clamp to `[w_min, w_max]`; returns the new weight.
    pub fn apply_delta(
        &mut self,
        source: usize,
        target: usize,
        dw: Weight,
        w_min: Weight,
        w_max: Weight,
    ) -> Weight {
        let w = &mut self.weights[[target, source]];
        *w = (*w + dw).clamp(w_min, w_max);
        *w
    }

    pub(crate) fn set_weight_at(&mut self, source: usize, target: usize, weight: Weight) {
        self.weights[[target, source]] = weight;
    }

    /// Snapshot the current matrix into the weight history
    pub fn record_weights(&mut self) {
        self.history.push(self.weights.clone());
    }

    pub fn weight_history(&self) -> &[Array2<Weight>] {
        &self.history
    }
}
