use crate::collective::DofMapping;
use crate::parameters::{Parameter, ParameterRange};
use ::proptest::collection::{btree_set, vec};
use ::proptest::prelude::*;
use nalgebra::Point2;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Keep coordinates small enough that geometric predicates stay well conditioned
    let range = -10.0..10.0;
    [range.clone(), range.clone()].prop_map(|[x, y]| Point2::new(x, y))
}

/// DOF maps with DOFs below `max_dof` and cells below `max_cell`.
pub fn dof_mapping(max_dof: usize, max_cell: usize) -> impl Strategy<Value = DofMapping> {
    vec((0..max_dof, btree_set(0..max_cell, 1..4)), 0..8).prop_map(|entries| {
        let mut mapping = DofMapping::new();
        for (dof, cells) in entries {
            for cell in cells {
                mapping.insert(dof, cell);
            }
        }
        mapping
    })
}

/// Parameter ranges of dimension `1..=max_dim` with non-degenerate intervals.
pub fn parameter_range(max_dim: usize) -> impl Strategy<Value = ParameterRange> {
    vec((-10.0..10.0, 0.01..5.0), 1..=max_dim).prop_map(|intervals: Vec<(f64, f64)>| {
        ParameterRange::new(
            intervals
                .into_iter()
                .map(|(min, width)| (min, min + width))
                .collect(),
        )
    })
}

/// A parameter range together with a parameter inside it.
pub fn parameter_in_range(max_dim: usize) -> impl Strategy<Value = (ParameterRange, Parameter)> {
    parameter_range(max_dim).prop_flat_map(|range| {
        let coordinates: Vec<_> = range.intervals().iter().map(|&(min, max)| min..=max).collect();
        (Just(range), coordinates).prop_map(|(range, values)| (range, Parameter::new(values)))
    })
}
