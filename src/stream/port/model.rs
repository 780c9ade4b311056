// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use super::{
    Cardinality, PortKind, WindowMode, WindowPunctuationInputMode, WindowPunctuationOutputMode,
};
use crate::error::{Error, OperonResult};
use serde::Deserialize;

/// Declaration of a group of input ports sharing cardinality and modes
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InputPortSet {
    pub description: String,
    pub cardinality: Cardinality,
    pub optional: bool,
    pub window_mode: WindowMode,
    pub punctuation_mode: WindowPunctuationInputMode,
}

impl InputPortSet {
    /// Exactly one required, non-windowed, punctuation oblivious port
    pub fn required(description: impl Into<String>) -> Self {
        InputPortSet {
            description: description.into(),
            cardinality: Cardinality::Fixed(1),
            optional: false,
            window_mode: WindowMode::NonWindowed,
            punctuation_mode: WindowPunctuationInputMode::Oblivious,
        }
    }

    /// Zero or more non-windowed, punctuation oblivious ports
    pub fn optional(description: impl Into<String>) -> Self {
        InputPortSet {
            cardinality: Cardinality::Unbounded,
            optional: true,
            ..InputPortSet::required(description)
        }
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn window_mode(mut self, mode: WindowMode) -> Self {
        self.window_mode = mode;
        self
    }

    pub fn punctuation_mode(mut self, mode: WindowPunctuationInputMode) -> Self {
        self.punctuation_mode = mode;
        self
    }
}

/// Declaration of a group of output ports sharing cardinality and punctuation mode
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OutputPortSet {
    pub description: String,
    pub cardinality: Cardinality,
    pub optional: bool,
    pub punctuation_mode: WindowPunctuationOutputMode,
}

impl OutputPortSet {
    /// Exactly one required port on which the operator generates punctuation
    pub fn required(description: impl Into<String>) -> Self {
        OutputPortSet {
            description: description.into(),
            cardinality: Cardinality::Fixed(1),
            optional: false,
            punctuation_mode: WindowPunctuationOutputMode::Generating,
        }
    }

    /// Zero or more ports on which the operator generates punctuation
    pub fn optional(description: impl Into<String>) -> Self {
        OutputPortSet {
            cardinality: Cardinality::Unbounded,
            optional: true,
            ..OutputPortSet::required(description)
        }
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn punctuation_mode(mut self, mode: WindowPunctuationOutputMode) -> Self {
        self.punctuation_mode = mode;
        self
    }
}

/// The three shapes an operator can take
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorPattern {
    /// Receives tuples and optionally submits tuples
    Process,
    /// Consumes tuples without producing an output stream
    Sink,
    /// Produces tuples from a dedicated thread without any input stream
    Source,
}

/// Static description of an operator: identity plus declared port sets
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OperatorModel {
    pub name: String,
    pub namespace: String,
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<InputPortSet>,
    #[serde(default)]
    pub outputs: Vec<OutputPortSet>,
}

impl OperatorModel {
    /// Creates a model without any ports
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        OperatorModel {
            description: format!("Operator {}", name),
            name,
            namespace: namespace.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Creates a model with the port sets of the given [OperatorPattern]
    pub fn for_pattern(
        pattern: OperatorPattern,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let model = OperatorModel::new(name, namespace);
        let inputs = || {
            vec![
                InputPortSet::required("Port that ingests tuples"),
                InputPortSet::optional("Optional input ports"),
            ]
        };
        let outputs = || {
            vec![
                OutputPortSet::required("Port that produces tuples"),
                OutputPortSet::optional("Optional output ports"),
            ]
        };
        match pattern {
            OperatorPattern::Process => OperatorModel {
                inputs: inputs(),
                outputs: outputs(),
                ..model
            },
            OperatorPattern::Sink => OperatorModel {
                inputs: inputs(),
                ..model
            },
            OperatorPattern::Source => OperatorModel {
                outputs: outputs(),
                ..model
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, set: InputPortSet) -> Self {
        self.inputs.push(set);
        self
    }

    pub fn with_output(mut self, set: OutputPortSet) -> Self {
        self.outputs.push(set);
        self
    }

    /// `namespace::name`, or just the name for the default namespace
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.namespace, self.name)
        }
    }

    /// Checks that the declared port sets can be satisfied by some invocation
    pub fn validate(&self) -> OperonResult<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidModel {
                msg: String::from("operator name must not be empty"),
            });
        }
        check_sets(PortKind::Input, &self.input_shape())?;
        check_sets(PortKind::Output, &self.output_shape())
    }

    /// Maps each of `count` concrete input ports to the index of its declared set
    pub(crate) fn assign_inputs(&self, count: usize) -> OperonResult<Vec<usize>> {
        assign_ports(PortKind::Input, &self.input_shape(), count)
    }

    /// Maps each of `count` concrete output ports to the index of its declared set
    pub(crate) fn assign_outputs(&self, count: usize) -> OperonResult<Vec<usize>> {
        assign_ports(PortKind::Output, &self.output_shape(), count)
    }

    fn input_shape(&self) -> Vec<(Cardinality, bool)> {
        self.inputs
            .iter()
            .map(|s| (s.cardinality, s.optional))
            .collect()
    }

    fn output_shape(&self) -> Vec<(Cardinality, bool)> {
        self.outputs
            .iter()
            .map(|s| (s.cardinality, s.optional))
            .collect()
    }
}

fn check_sets(kind: PortKind, sets: &[(Cardinality, bool)]) -> OperonResult<()> {
    for (i, (cardinality, optional)) in sets.iter().enumerate() {
        let last = i + 1 == sets.len();
        match cardinality {
            Cardinality::Fixed(0) => {
                return Err(Error::InvalidModel {
                    msg: format!("{} port set {} has a cardinality of zero", kind, i),
                })
            }
            Cardinality::Unbounded if !last => {
                return Err(Error::InvalidModel {
                    msg: format!(
                        "{} port set {} is unbounded but only the last set may be",
                        kind, i
                    ),
                })
            }
            _ => (),
        }
        if *optional && sets[i + 1..].iter().any(|(_, o)| !o) {
            return Err(Error::InvalidModel {
                msg: format!(
                    "optional {} port set {} precedes a required set",
                    kind, i
                ),
            });
        }
    }
    Ok(())
}

fn assign_ports(
    kind: PortKind,
    sets: &[(Cardinality, bool)],
    count: usize,
) -> OperonResult<Vec<usize>> {
    let mut assigned = Vec::with_capacity(count);
    let mut remaining = count;

    for (set, (cardinality, optional)) in sets.iter().enumerate() {
        let take = match *cardinality {
            Cardinality::Fixed(n) if remaining >= n => n,
            Cardinality::Fixed(_) if remaining == 0 && *optional => 0,
            Cardinality::Fixed(n) => {
                return Err(Error::InvalidBinding {
                    msg: format!(
                        "{} port set {} needs {} ports but {} remain",
                        kind, set, n, remaining
                    ),
                })
            }
            Cardinality::Unbounded if remaining == 0 && !optional => {
                return Err(Error::InvalidBinding {
                    msg: format!("{} port set {} needs at least one port", kind, set),
                })
            }
            Cardinality::Unbounded => remaining,
        };
        assigned.extend(std::iter::repeat(set).take(take));
        remaining -= take;
    }

    if remaining > 0 {
        return Err(Error::InvalidBinding {
            msg: format!(
                "{} {} ports are not covered by any declared port set",
                remaining, kind
            ),
        });
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_models_are_valid() {
        for pattern in [
            OperatorPattern::Process,
            OperatorPattern::Sink,
            OperatorPattern::Source,
        ]
        .iter()
        {
            let model = OperatorModel::for_pattern(*pattern, "Op", "com.acme");
            model.validate().unwrap();
        }

        let sink = OperatorModel::for_pattern(OperatorPattern::Sink, "Op", "com.acme");
        assert_eq!(sink.inputs.len(), 2);
        assert!(sink.outputs.is_empty());
        assert_eq!(sink.qualified_name(), "com.acme::Op");
        assert_eq!(sink.description, "Operator Op");

        let source = OperatorModel::for_pattern(OperatorPattern::Source, "Op", "");
        assert!(source.inputs.is_empty());
        assert_eq!(
            source.outputs[0].punctuation_mode,
            WindowPunctuationOutputMode::Generating
        );
        assert_eq!(source.qualified_name(), "Op");
    }

    #[test]
    fn invalid_declarations() {
        let unbounded_first = OperatorModel::new("Op", "")
            .with_input(InputPortSet::optional("a"))
            .with_input(InputPortSet::optional("b"));
        assert!(matches!(
            unbounded_first.validate(),
            Err(Error::InvalidModel { .. })
        ));

        let optional_before_required = OperatorModel::new("Op", "")
            .with_output(OutputPortSet::required("a").cardinality(Cardinality::Fixed(1)))
            .with_output(OutputPortSet {
                optional: true,
                ..OutputPortSet::required("b")
            })
            .with_output(OutputPortSet::required("c"));
        assert!(optional_before_required.validate().is_err());

        let zero = OperatorModel::new("Op", "")
            .with_input(InputPortSet::required("a").cardinality(Cardinality::Fixed(0)));
        assert!(zero.validate().is_err());

        assert!(OperatorModel::new("", "").validate().is_err());
    }

    #[test]
    fn assignment_to_sets() {
        let model = OperatorModel::for_pattern(OperatorPattern::Process, "Op", "");
        assert_eq!(model.assign_inputs(1).unwrap(), vec![0]);
        assert_eq!(model.assign_inputs(3).unwrap(), vec![0, 1, 1]);
        assert!(matches!(
            model.assign_inputs(0),
            Err(Error::InvalidBinding { .. })
        ));

        let fixed = OperatorModel::new("Op", "")
            .with_input(InputPortSet::required("pair").cardinality(Cardinality::Fixed(2)));
        assert_eq!(fixed.assign_inputs(2).unwrap(), vec![0, 0]);
        assert!(fixed.assign_inputs(1).is_err());
        assert!(fixed.assign_inputs(3).is_err());

        let source = OperatorModel::for_pattern(OperatorPattern::Source, "Op", "");
        assert_eq!(source.assign_inputs(0).unwrap(), Vec::<usize>::new());
        assert!(source.assign_inputs(1).is_err());
        assert_eq!(source.assign_outputs(2).unwrap(), vec![0, 1]);
    }
}
