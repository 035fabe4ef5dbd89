//! Cortical columns: an indexed, ordered set of named layers.

use crate::population::{LayerState, NeuronPopulation, PopulationSpec};
use laminar_core::{ChannelInputs, LaminarError, Result, Time, Voltage};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-layer channel inputs for one column and one step
pub type LayerInputs = HashMap<String, ChannelInputs>;

/// A named population inside a column
#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub population: Box<dyn NeuronPopulation>,
}

/// Readout of every layer in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnState {
    pub index: usize,
    pub layers: Vec<(String, LayerState)>,
}

impl ColumnState {
    pub fn get(&self, layer: &str) -> Option<&LayerState> {
        self.layers
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// One cortical column
#[derive(Debug)]
pub struct Column {
    index: usize,
    layers: Vec<Layer>,
}

impl Column {
    /// Assemble a column from already-built populations.
    ///
    /// Layer order is preserved and is the order used everywhere a column
    /// is enumerated.
    pub fn new(index: usize, layers: Vec<(String, Box<dyn NeuronPopulation>)>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &layers {
            if !seen.insert(name.as_str()) {
                return Err(LaminarError::Configuration(format!(
                    "duplicate layer '{}' in column {}",
                    name, index
                )));
            }
        }
        let layers = layers
            .into_iter()
            .map(|(name, population)| Layer { name, population })
            .collect();
        Ok(Self { index, layers })
    }

    pub fn from_spec(spec: &ColumnSpec, dt: Time) -> Result<Self> {
        let mut layers = Vec::with_capacity(spec.layers.len());
        for layer in &spec.layers {
            let model = layer.population.as_ref().unwrap_or(&spec.population);
            let population = model.build(layer.n_units, dt).map_err(|e| match e {
                LaminarError::Configuration(msg) => LaminarError::Configuration(format!(
                    "column {} layer '{}': {}",
                    spec.index, layer.name, msg
                )),
                other => other,
            })?;
            layers.push((layer.name.clone(), population));
        }
        let column = Self::new(spec.index, layers)?;
        log::debug!(
            "built column {} with layers [{}]",
            column.index,
            column.layer_names().collect::<Vec<_>>().join(", ")
        );
        Ok(column)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name.as_str())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn position_of(&self, layer: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == layer)
    }

    pub fn layer(&self, name: &str) -> Option<&dyn NeuronPopulation> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.population.as_ref())
    }

    pub fn layer_at(&self, position: usize) -> Option<&dyn NeuronPopulation> {
        self.layers.get(position).map(|l| l.population.as_ref())
    }

    /// Check every input against this column's layers without mutating.
    pub fn validate_inputs(&self, inputs: &LayerInputs) -> Result<()> {
        for (name, channels) in inputs {
            let population = self.layer(name).ok_or_else(|| LaminarError::Lookup {
                column: self.index,
                layer: name.clone(),
            })?;
            population
                .validate_inputs(channels)
                .map_err(|e| self.in_layer(name, e))?;
        }
        Ok(())
    }

    /// Advance every layer one step. Layers without an entry get no input.
    pub fn update(&mut self, inputs: &LayerInputs, t: Time) -> Result<()> {
        self.validate_inputs(inputs)?;
        let empty = ChannelInputs::new();
        for layer in &mut self.layers {
            let channels = inputs.get(&layer.name).unwrap_or(&empty);
            layer.population.update(channels, t)?;
        }
        Ok(())
    }

    pub fn get_state(&self) -> ColumnState {
        ColumnState {
            index: self.index,
            layers: self
                .layers
                .iter()
                .map(|l| (l.name.clone(), l.population.state()))
                .collect(),
        }
    }

    /// Membrane voltages of the spike-based layers
    pub fn voltages(&self) -> Vec<(String, Array1<Voltage>)> {
        self.layers
            .iter()
            .filter_map(|l| l.population.voltages().map(|v| (l.name.clone(), v.clone())))
            .collect()
    }

    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.population.reset();
        }
    }

    fn in_layer(&self, layer: &str, err: LaminarError) -> LaminarError {
        match err {
            LaminarError::Dimension {
                context,
                expected,
                got,
            } => LaminarError::Dimension {
                context: format!("column {} layer '{}' {}", self.index, layer, context),
                expected,
                got,
            },
            LaminarError::Configuration(msg) => LaminarError::Configuration(format!(
                "column {} layer '{}': {}",
                self.index, layer, msg
            )),
            other => other,
        }
    }
}

/// One layer of a column description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub n_units: usize,
    /// Overrides the column-wide population model
    #[serde(default)]
    pub population: Option<PopulationSpec>,
}

impl LayerSpec {
    pub fn new(name: &str, n_units: usize) -> Self {
        Self {
            name: name.to_string(),
            n_units,
            population: None,
        }
    }

    pub fn with_population(mut self, population: PopulationSpec) -> Self {
        self.population = Some(population);
        self
    }
}

/// Column description: index, layers and the default population model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub index: usize,
    #[serde(default)]
    pub population: PopulationSpec,
    pub layers: Vec<LayerSpec>,
}

impl ColumnSpec {
    pub fn new(index: usize, population: PopulationSpec) -> Self {
        Self {
            index,
            population,
            layers: Vec::new(),
        }
    }

    pub fn layer(mut self, name: &str, n_units: usize) -> Self {
        self.layers.push(LayerSpec::new(name, n_units));
        self
    }

    pub fn layer_with(mut self, layer: LayerSpec) -> Self {
        self.layers.push(layer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{PopulationKind, RateParams};
    use laminar_core::{ChannelInput, GainFunction, SynapseChannel};

    fn mixed_spec() -> ColumnSpec {
        ColumnSpec::new(3, PopulationSpec::default())
            .layer("L4", 5)
            .layer("L2/3", 8)
            .layer_with(LayerSpec::new("L5", 4).with_population(PopulationSpec::LeakyRate(
                RateParams {
                    tau_a: 5.0,
                    gain: GainFunction::Identity,
                },
            )))
    }

    #[test]
    fn test_layer_order_preserved() {
        let column = Column::from_spec(&mixed_spec(), 0.1).unwrap();
        assert_eq!(column.index(), 3);
        let names: Vec<_> = column.layer_names().collect();
        assert_eq!(names, vec!["L4", "L2/3", "L5"]);

        let state = column.get_state();
        assert_eq!(state.len(), 3);
        assert_eq!(state.layers[1].0, "L2/3");
        assert_eq!(state.get("L2/3").unwrap().len(), 8);
        assert_eq!(state.get("L5").unwrap().kind(), PopulationKind::RateBased);
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        let spec = ColumnSpec::new(0, PopulationSpec::default())
            .layer("L4", 2)
            .layer("L4", 3);
        assert!(matches!(
            Column::from_spec(&spec, 0.1),
            Err(LaminarError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_layer_input() {
        let mut column = Column::from_spec(&mixed_spec(), 0.1).unwrap();
        let mut inputs = LayerInputs::new();
        inputs.insert("L6".into(), ChannelInputs::new());
        let err = column.update(&inputs, 0.0).unwrap_err();
        assert!(matches!(err, LaminarError::Lookup { column: 3, .. }));
    }

    #[test]
    fn test_update_drives_only_named_layer() {
        let mut column = Column::from_spec(&mixed_spec(), 0.1).unwrap();
        let mut inputs = LayerInputs::new();
        inputs.insert(
            "L5".into(),
            [(SynapseChannel::Total, ChannelInput::Scalar(1.0))].into_iter().collect(),
        );
        column.update(&inputs, 0.0).unwrap();

        let state = column.get_state();
        assert!(state.get("L5").unwrap().mean() > 0.0);
        assert_eq!(state.get("L4").unwrap().mean(), 0.0);
        assert_eq!(column.voltages().len(), 2);
    }

    #[test]
    fn test_bad_input_leaves_column_untouched() {
        let mut column = Column::from_spec(&mixed_spec(), 0.1).unwrap();
        let mut inputs = LayerInputs::new();
        inputs.insert(
            "L4".into(),
            [(SynapseChannel::Noise, ChannelInput::Scalar(20.0))].into_iter().collect(),
        );
        inputs.insert(
            "L5".into(),
            [(SynapseChannel::Total, ChannelInput::from(vec![1.0; 3]))].into_iter().collect(),
        );
        let err = column.update(&inputs, 0.0).unwrap_err();
        assert!(matches!(err, LaminarError::Dimension { expected: 4, got: 3, .. }));
        assert_eq!(column.get_state().get("L4").unwrap().mean(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut column = Column::from_spec(&mixed_spec(), 0.1).unwrap();
        let initial = column.get_state();
        let mut inputs = LayerInputs::new();
        inputs.insert(
            "L4".into(),
            [(SynapseChannel::Noise, ChannelInput::Scalar(20.0))].into_iter().collect(),
        );
        column.update(&inputs, 0.0).unwrap();
        assert_ne!(column.get_state(), initial);
        column.reset();
        assert_eq!(column.get_state(), initial);
    }
}
