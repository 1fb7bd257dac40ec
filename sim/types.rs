// ========================================================================================
//                          Shared Lattice and Boundary Contracts
// ========================================================================================

// Types that cross module lines live here; a type used by one module stays beside it.

use std::fmt;

/// A lattice coordinate as `[row, column]`.
pub type Coord = [usize; 2];

/// The lattice direction along which a boundary edge crosses the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeAxis {
    /// The pair differs in the row index (neighbours stacked vertically).
    Vertical,
    /// The pair differs in the column index (neighbours side by side).
    Horizontal,
}

impl EdgeAxis {
    pub const ALL: [EdgeAxis; 2] = [EdgeAxis::Vertical, EdgeAxis::Horizontal];

    /// The ndarray axis this direction steps along.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Vertical => 0,
            Self::Horizontal => 1,
        }
    }

    /// The neighbour one step further along this axis, if it lies on a lattice of `shape`.
    #[inline]
    pub fn step(self, coord: Coord, shape: (usize, usize)) -> Option<Coord> {
        match self {
            Self::Vertical if coord[0] + 1 < shape.0 => Some([coord[0] + 1, coord[1]]),
            Self::Horizontal if coord[1] + 1 < shape.1 => Some([coord[0], coord[1] + 1]),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertical => f.write_str("vertical"),
            Self::Horizontal => f.write_str("horizontal"),
        }
    }
}

/// One lattice edge straddling an excursion-set boundary.
///
/// `inner` lies inside the set and `outer` is its axis-aligned neighbour outside it.
/// Which of the two comes first in lattice order is carried by the coordinates
/// themselves, never by the position of a value in an array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryEdge {
    pub inner: Coord,
    pub outer: Coord,
    pub axis: EdgeAxis,
}

/// The values of one field at the two ends of a boundary edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgePair {
    pub inner: f64,
    pub outer: f64,
}

impl EdgePair {
    /// Linear interpolation from the inner value towards the outer value.
    ///
    /// An infinite endpoint is returned as it is, sign included. A NaN endpoint, or two
    /// infinite endpoints of opposite sign, give `+∞` so that the location stays visible
    /// in any maximum taken downstream.
    #[inline]
    pub fn interpolate(self, weight: f64) -> f64 {
        let (inner, outer) = (self.inner, self.outer);
        if inner.is_nan() || outer.is_nan() {
            return f64::INFINITY;
        }
        match (inner.is_infinite(), outer.is_infinite()) {
            (false, false) => inner + weight * (outer - inner),
            (true, false) => inner,
            (false, true) => outer,
            (true, true) if inner == outer => inner,
            (true, true) => f64::INFINITY,
        }
    }
}

/// A value carried once for each of the two tracked fields.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct FieldPair<T> {
    pub first: T,
    pub second: T,
}

impl<T> FieldPair<T> {
    pub fn new(first: T, second: T) -> Self {
        Self { first, second }
    }

    pub fn as_ref(&self) -> FieldPair<&T> {
        FieldPair {
            first: &self.first,
            second: &self.second,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> FieldPair<U> {
        FieldPair {
            first: f(self.first),
            second: f(self.second),
        }
    }

    /// Relabels field 1 as field 2 and vice versa.
    pub fn swapped(self) -> Self {
        Self {
            first: self.second,
            second: self.first,
        }
    }
}

/// Which boundary the bootstrap was run on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryVariant {
    /// The boundary of the true intersection `Fc`.
    True,
    /// The boundary of the estimated intersection `FcHat`.
    Estimated,
}

impl BoundaryVariant {
    pub const ALL: [BoundaryVariant; 2] = [BoundaryVariant::True, BoundaryVariant::Estimated];

    /// Prefix used in result file names.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::Estimated => "est",
        }
    }
}

impl fmt::Display for BoundaryVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true boundary"),
            Self::Estimated => f.write_str("estimated boundary"),
        }
    }
}

/// A value carried once per boundary variant.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ByVariant<T> {
    pub true_boundary: T,
    pub estimated_boundary: T,
}

impl<T> ByVariant<T> {
    pub fn get(&self, variant: BoundaryVariant) -> &T {
        match variant {
            BoundaryVariant::True => &self.true_boundary,
            BoundaryVariant::Estimated => &self.estimated_boundary,
        }
    }

    pub fn get_mut(&mut self, variant: BoundaryVariant) -> &mut T {
        match variant {
            BoundaryVariant::True => &mut self.true_boundary,
            BoundaryVariant::Estimated => &mut self.estimated_boundary,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> ByVariant<U> {
        ByVariant {
            true_boundary: f(self.true_boundary),
            estimated_boundary: f(self.estimated_boundary),
        }
    }
}

/// How containment of the true set is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Assessment {
    /// Set logic over every lattice voxel.
    Voxelwise,
    /// Bracket check of the statistic interpolated onto the true boundary,
    /// conjoined with the voxelwise check.
    Interpolated,
}

impl Assessment {
    pub const ALL: [Assessment; 2] = [Assessment::Voxelwise, Assessment::Interpolated];

    /// Suffix used in result file names.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Voxelwise => "",
            Self::Interpolated => "_intrp",
        }
    }
}
