//! Model contract and output descriptors.

use ndarray::ArrayD;

use crate::common::error::EvalResult;
use crate::data::domain::{leaf_name, Columns};

/// How the labels of an output are scored.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OutputKind {
    /// Binary states, scored with classification metrics.
    Binary,
    /// Real-valued targets such as per-site mean or variance.
    Continuous,
    /// One-hot classes across the last axis.
    Categorical,
}

impl OutputKind {
    /// Kind implied by the leaf of an output name.
    pub fn from_name(name: &str) -> Self {
        match leaf_name(name) {
            "mean" | "var" => OutputKind::Continuous,
            "cat_var" => OutputKind::Categorical,
            _ => OutputKind::Binary,
        }
    }
}

/// One named model output.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct OutputSpec {
    pub name: String,
    pub kind: OutputKind,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, kind: OutputKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Descriptor whose kind is derived from the name.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = OutputKind::from_name(&name);
        Self { name, kind }
    }
}

/// A loaded model. The order of [`Model::outputs`] is the order of the arrays
/// returned by [`Model::predict`].
pub trait Model {
    fn name(&self) -> &str;

    /// Input columns the model reads.
    fn inputs(&self) -> &[String];

    fn outputs(&self) -> &[OutputSpec];

    /// One array per declared output, axis 0 being the sample axis.
    fn predict(&self, inputs: &Columns) -> EvalResult<Vec<ArrayD<f32>>>;

    fn output_names(&self) -> Vec<String> {
        self.outputs().iter().map(|o| o.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_leaf_name() {
        assert_eq!(OutputKind::from_name("cpg/BS27_1_SER"), OutputKind::Binary);
        assert_eq!(OutputKind::from_name("cpg/mean"), OutputKind::Continuous);
        assert_eq!(OutputKind::from_name("cpg/var"), OutputKind::Continuous);
        assert_eq!(OutputKind::from_name("cpg/cat_var"), OutputKind::Categorical);
        assert_eq!(OutputKind::from_name("cpg/cat2_var"), OutputKind::Binary);
    }
}
