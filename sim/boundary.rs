//! # Boundary Location and Value Extraction
//!
//! An excursion set `{field > c}` on a 2-D lattice has a discrete boundary made of
//! axis-aligned voxel pairs whose membership differs. This module finds those pairs
//! and gathers the values any other field takes at their two ends.
//!
//! Extraction is a pure gather: no interpolation happens here. The same [`Boundary`]
//! serves scalar fields (means, statistics) through [`Boundary::values`] and
//! per-subject data through [`Boundary::subject_values`], which keeps the subject
//! axis so residuals can be bootstrapped edge by edge.

use crate::types::{BoundaryEdge, Coord, EdgeAxis, EdgePair};
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};

/// The discrete boundary of one excursion set.
///
/// Edges are ordered by axis (vertical first), then in row-major order of the
/// lower-indexed voxel of each pair. An empty boundary is a valid outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    shape: (usize, usize),
    edges: Vec<BoundaryEdge>,
}

impl Boundary {
    /// Locates the boundary of `{field > threshold}`.
    pub fn locate(field: ArrayView2<f64>, threshold: f64) -> Self {
        let mask = field.mapv(|v| v > threshold);
        Self::from_mask(mask.view())
    }

    /// Locates the boundary of an excursion set given as a boolean mask.
    pub fn from_mask(mask: ArrayView2<bool>) -> Self {
        let shape = mask.dim();
        let mut edges = Vec::new();

        for axis in EdgeAxis::ALL {
            for ((row, col), &here) in mask.indexed_iter() {
                let coord: Coord = [row, col];
                let Some(next) = axis.step(coord, shape) else {
                    continue;
                };
                let there = mask[next];
                if here == there {
                    continue;
                }
                let (inner, outer) = if here { (coord, next) } else { (next, coord) };
                edges.push(BoundaryEdge { inner, outer, axis });
            }
        }

        Self { shape, edges }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn edges(&self) -> &[BoundaryEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges crossing along one lattice direction.
    pub fn along(&self, axis: EdgeAxis) -> impl Iterator<Item = &BoundaryEdge> + '_ {
        self.edges.iter().filter(move |edge| edge.axis == axis)
    }

    /// Gathers the inner/outer values of `field` at every edge.
    pub fn values(&self, field: ArrayView2<f64>) -> BoundaryValues {
        self.assert_shape(field.dim());
        let inner = self.edges.iter().map(|edge| field[edge.inner]).collect();
        let outer = self.edges.iter().map(|edge| field[edge.outer]).collect();
        BoundaryValues { inner, outer }
    }

    /// Gathers the inner/outer values of `field` at the edges along one direction.
    pub fn values_along(&self, field: ArrayView2<f64>, axis: EdgeAxis) -> Vec<EdgePair> {
        self.assert_shape(field.dim());
        self.along(axis)
            .map(|edge| EdgePair {
                inner: field[edge.inner],
                outer: field[edge.outer],
            })
            .collect()
    }

    /// Gathers per-subject values from data shaped `[n_subjects, rows, cols]`.
    pub fn subject_values(&self, data: ArrayView3<f64>) -> SubjectBoundaryValues {
        let (n_subjects, rows, cols) = data.dim();
        self.assert_shape((rows, cols));

        let mut inner = Array2::zeros((n_subjects, self.edges.len()));
        let mut outer = Array2::zeros((n_subjects, self.edges.len()));
        for (subject, image) in data.axis_iter(Axis(0)).enumerate() {
            for (e, edge) in self.edges.iter().enumerate() {
                inner[[subject, e]] = image[edge.inner];
                outer[[subject, e]] = image[edge.outer];
            }
        }

        SubjectBoundaryValues { inner, outer }
    }

    fn assert_shape(&self, dim: (usize, usize)) {
        assert_eq!(
            dim, self.shape,
            "Field shape does not match the lattice the boundary was located on"
        );
    }
}

/// Values of a scalar field at the two ends of every boundary edge, in edge order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryValues {
    pub inner: Array1<f64>,
    pub outer: Array1<f64>,
}

impl BoundaryValues {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn pair(&self, edge: usize) -> EdgePair {
        EdgePair {
            inner: self.inner[edge],
            outer: self.outer[edge],
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = EdgePair> + '_ {
        self.inner
            .iter()
            .zip(self.outer.iter())
            .map(|(&inner, &outer)| EdgePair { inner, outer })
    }
}

/// Per-subject values at every boundary edge. Both arrays are `[n_subjects, n_edges]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectBoundaryValues {
    pub inner: Array2<f64>,
    pub outer: Array2<f64>,
}

impl SubjectBoundaryValues {
    pub fn n_subjects(&self) -> usize {
        self.inner.nrows()
    }

    pub fn n_edges(&self) -> usize {
        self.inner.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, array};

    #[test]
    fn uniform_fields_have_no_boundary() {
        let above = Array2::from_elem((5, 6), 3.0);
        assert!(Boundary::locate(above.view(), 1.0).is_empty());

        let below = Array2::from_elem((5, 6), -3.0);
        assert!(Boundary::locate(below.view(), 1.0).is_empty());
    }

    #[test]
    fn single_voxel_has_four_edges() {
        let mut field = Array2::zeros((3, 3));
        field[[1, 1]] = 2.0;
        let boundary = Boundary::locate(field.view(), 1.0);

        assert_eq!(boundary.len(), 4);
        assert!(boundary.edges().iter().all(|edge| edge.inner == [1, 1]));
        assert_eq!(boundary.along(EdgeAxis::Vertical).count(), 2);
        assert_eq!(boundary.along(EdgeAxis::Horizontal).count(), 2);

        let outers: Vec<Coord> = boundary.edges().iter().map(|edge| edge.outer).collect();
        assert_eq!(outers, vec![[0, 1], [2, 1], [1, 0], [1, 2]]);
    }

    #[test]
    fn half_plane_crosses_in_one_direction_only() {
        let field = array![[0.0, 0.0, 5.0, 5.0], [0.0, 0.0, 5.0, 5.0]];
        let boundary = Boundary::locate(field.view(), 2.5);

        assert_eq!(boundary.along(EdgeAxis::Vertical).count(), 0);
        let horizontal: Vec<&BoundaryEdge> = boundary.along(EdgeAxis::Horizontal).collect();
        assert_eq!(horizontal.len(), 2);
        assert_eq!(horizontal[0].inner, [0, 2]);
        assert_eq!(horizontal[0].outer, [0, 1]);
    }

    #[test]
    fn values_are_gathered_in_edge_order() {
        let field = array![[0.0, 1.0], [4.0, 9.0]];
        let boundary = Boundary::locate(field.view(), 3.0);
        let values = boundary.values(field.view());

        assert_eq!(values.len(), boundary.len());
        for (edge, pair) in boundary.edges().iter().zip(values.pairs()) {
            assert_eq!(pair.inner, field[edge.inner]);
            assert_eq!(pair.outer, field[edge.outer]);
            assert!(pair.inner > 3.0 && pair.outer <= 3.0);
        }

        let vertical = boundary.values_along(field.view(), EdgeAxis::Vertical);
        assert_eq!(
            vertical,
            vec![
                EdgePair {
                    inner: 4.0,
                    outer: 0.0
                },
                EdgePair {
                    inner: 9.0,
                    outer: 1.0
                }
            ]
        );
    }

    #[test]
    fn subject_values_keep_the_subject_axis() {
        let mut data = Array3::zeros((3, 2, 2));
        for s in 0..3 {
            for r in 0..2 {
                for c in 0..2 {
                    data[[s, r, c]] = (100 * s + 10 * r + c) as f64;
                }
            }
        }
        let mask = array![[true, false], [false, false]];
        let boundary = Boundary::from_mask(mask.view());
        let values = boundary.subject_values(data.view());

        assert_eq!(values.n_subjects(), 3);
        assert_eq!(values.n_edges(), 2);
        for s in 0..3 {
            let scalar = boundary.values(data.index_axis(Axis(0), s));
            assert_eq!(values.inner.row(s), scalar.inner);
            assert_eq!(values.outer.row(s), scalar.outer);
        }
    }

    #[test]
    fn empty_boundary_extracts_empty_panels() {
        let field = Array2::from_elem((4, 4), 1.0);
        let boundary = Boundary::locate(field.view(), 0.0);
        let data = Array3::<f64>::zeros((5, 4, 4));

        assert!(boundary.values(field.view()).is_empty());
        let panel = boundary.subject_values(data.view());
        assert_eq!(panel.n_subjects(), 5);
        assert_eq!(panel.n_edges(), 0);
    }
}
