//! Parameters, parameter ranges and finite subsets of the parameter space.
use crate::collective::Communicator;
use crate::io::Folder;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// A point $\mu$ in the parameter space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameter(Vec<f64>);

impl Parameter {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Deref for Parameter {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for Parameter {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for Parameter {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Parameter {
    fn from(values: [f64; N]) -> Self {
        Self(values.to_vec())
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().format(", "))
    }
}

/// Box-shaped parameter domain, given as one closed interval per parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange(Vec<(f64, f64)>);

impl ParameterRange {
    /// # Panics
    ///
    /// Panics if any interval has a lower bound greater than its upper bound.
    pub fn new(intervals: Vec<(f64, f64)>) -> Self {
        for (i, &(min, max)) in intervals.iter().enumerate() {
            assert!(min <= max, "Invalid parameter range [{min}, {max}] for parameter {i}");
        }
        Self(intervals)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn intervals(&self) -> &[(f64, f64)] {
        &self.0
    }

    pub fn contains(&self, mu: &Parameter) -> bool {
        mu.dim() == self.dim()
            && mu
                .iter()
                .zip(&self.0)
                .all(|(&mu_i, &(min, max))| min <= mu_i && mu_i <= max)
    }

    /// The parameter made up of the lower bound of each interval.
    pub fn min_parameter(&self) -> Parameter {
        Parameter(self.0.iter().map(|&(min, _)| min).collect())
    }
}

/// Distribution used to sample a finite subset of the parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Independent uniform samples from a seeded generator.
    Uniform { seed: u64 },
    /// A tensor grid with (approximately) the same number of points in each direction.
    Equispaced,
}

impl Default for Distribution {
    fn default() -> Self {
        Self::Uniform { seed: 0 }
    }
}

/// An ordered, finite set of parameters, e.g. a training or testing set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpaceSubset(Vec<Parameter>);

impl ParameterSpaceSubset {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self(parameters)
    }

    /// Samples `n` parameters from the range.
    ///
    /// For the equispaced distribution, $\operatorname{round}(n^{1/d})$ points are used along each
    /// of the $d$ directions, so the actual size may differ from `n` when `n` is not a perfect
    /// power.
    pub fn generate(range: &ParameterRange, n: usize, distribution: Distribution) -> Self {
        let d = range.dim();
        if n == 0 {
            return Self::default();
        }
        if d == 0 {
            return Self(vec![Parameter::default(); n]);
        }
        match distribution {
            Distribution::Uniform { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                let samples = (0..n)
                    .map(|_| {
                        let values = range
                            .intervals()
                            .iter()
                            .map(|&(min, max)| {
                                if min == max {
                                    min
                                } else {
                                    rng.gen_range(min..=max)
                                }
                            })
                            .collect();
                        Parameter(values)
                    })
                    .collect();
                Self(samples)
            }
            Distribution::Equispaced => {
                let per_dim = ((n as f64).powf(1.0 / d as f64).round() as usize).max(1);
                let samples = range
                    .intervals()
                    .iter()
                    .map(|&(min, max)| linspace(min, max, per_dim))
                    .multi_cartesian_product()
                    .map(Parameter)
                    .collect();
                Self(samples)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    pub fn push(&mut self, mu: Parameter) {
        self.0.push(mu);
    }

    pub fn save(
        &self,
        folder: &Folder,
        name: &str,
        communicator: &dyn Communicator,
    ) -> eyre::Result<()> {
        folder.save(communicator, name, self)
    }

    pub fn load(folder: &Folder, name: &str) -> eyre::Result<Self> {
        folder.load(name)
    }
}

impl FromIterator<Parameter> for ParameterSpaceSubset {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ParameterSpaceSubset {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![0.5 * (min + max)];
    }
    (0..n)
        .map(|i| {
            if i + 1 == n {
                max
            } else {
                min + (max - min) * i as f64 / (n - 1) as f64
            }
        })
        .collect()
}
