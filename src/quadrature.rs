//! Triangle quadrature rules from `fenris`, expressed in barycentric coordinates.
use fenris::element::{FixedNodesReferenceFiniteElement, Tri3d2Element};
use fenris::quadrature::{total_order, QuadratureError};

/// A quadrature rule on a triangle.
///
/// Weights sum to one, so integrals are obtained by scaling with the area of the triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleQuadrature {
    weights: Vec<f64>,
    points: Vec<[f64; 3]>,
}

impl TriangleQuadrature {
    /// The total-order rule that integrates polynomials up to degree `strength` exactly.
    pub fn with_strength(strength: usize) -> Result<Self, QuadratureError> {
        let (weights, points) = total_order::triangle::<f64>(strength)?;
        let reference = Tri3d2Element::<f64>::reference();
        // The reference triangle has area 2
        let weights = weights.iter().map(|w| 0.5 * w).collect();
        let points = points
            .iter()
            .map(|xi| {
                let basis = reference.evaluate_basis(xi);
                [basis[0], basis[1], basis[2]]
            })
            .collect();
        Ok(Self { weights, points })
    }

    /// Exact for quadratic polynomials, hence for P1 mass matrices.
    pub fn strength_2() -> Self {
        Self::with_strength(2).expect("Triangle rules of strength 2 are always available")
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64; 3])> {
        self.weights.iter().copied().zip(self.points.iter())
    }
}

impl Default for TriangleQuadrature {
    fn default() -> Self {
        Self::strength_2()
    }
}
