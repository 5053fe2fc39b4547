//! Value container used by the evaluator.
//!
//! Values are dense `f64` matrices from `nalgebra`. A scalar is a 1×1 array
//! and a vector is an n×1 column.

use nalgebra::DMatrix;

pub type Array = DMatrix<f64>;

/// Absolute tolerance used by the equality operator unless overridden.
pub const EQUALITY_TOLERANCE: f64 = 1e-7;

pub fn scalar(value: f64) -> Array {
    Array::from_element(1, 1, value)
}

pub fn column(values: &[f64]) -> Array {
    Array::from_column_slice(values.len(), 1, values)
}

/// Builds an array from row slices. All rows must have the same length.
pub fn from_rows(rows: &[&[f64]]) -> Array {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, |r| r.len());
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Array::from_row_slice(nrows, ncols, &flat)
}

pub fn ones_like(value: &Array) -> Array {
    Array::from_element(value.nrows(), value.ncols(), 1.0)
}

pub fn zeros_like(value: &Array) -> Array {
    Array::zeros(value.nrows(), value.ncols())
}

/// Elementwise `|a - b| < tolerance`, encoded as 1.0 / 0.0.
pub fn near_equal(a: &Array, b: &Array, tolerance: f64) -> Array {
    a.zip_map(b, |x, y| if (x - y).abs() < tolerance { 1.0 } else { 0.0 })
}

pub fn sum(value: &Array) -> f64 {
    value.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_is_row_major() {
        let m = from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 0)], 3.0);
    }

    #[test]
    fn near_equal_uses_absolute_tolerance() {
        let a = column(&[1.0, 2.0, 3.0]);
        let b = column(&[1.0 + 1e-9, 2.1, 3.0 - 5e-8]);
        let mask = near_equal(&a, &b, EQUALITY_TOLERANCE);
        assert_eq!(mask.as_slice(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn like_constructors_keep_shape() {
        let m = from_rows(&[&[1.0, 2.0, 3.0]]);
        assert_eq!(ones_like(&m).shape(), (1, 3));
        assert_eq!(sum(&ones_like(&m)), 3.0);
        assert_eq!(sum(&zeros_like(&m)), 0.0);
    }
}
