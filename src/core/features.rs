//! Per-pixel feature derivation: scaled reflectances plus a fixed table of
//! spectral indices, standardized with the training-time scaler.
//!
//! Band indices are 0-based positions in the source raster. The index table
//! references bands 2, 3, 4, 5, 8, 9 and 10, so the source band order must
//! match the order the model was trained on.
use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::core::scaler::Scaler;
use crate::types::{BAND_COUNT, FEATURE_COUNT, REFLECTANCE_SCALE};

/// Added to every index denominator so no pixel divides by zero.
pub const EPSILON: f32 = 1e-10;

/// Soil brightness correction factor of the soil-adjusted index.
pub const SOIL_ADJUSTMENT: f32 = 0.5;

/// Arithmetic shape of a derived spectral index.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum IndexFormula {
    /// `(a - b) / (a + b + eps)`
    NormalizedDifference { a: usize, b: usize },
    /// `(1 + l) * (a - b) / (a + b + l + eps)`
    SoilAdjusted { a: usize, b: usize, l: f32 },
    /// `numerator / (denominator + eps)`
    Ratio { numerator: usize, denominator: usize },
    /// `a - b`
    Difference { a: usize, b: usize },
}

impl IndexFormula {
    #[inline]
    pub fn evaluate(&self, bands: &[f32; BAND_COUNT]) -> f32 {
        match *self {
            IndexFormula::NormalizedDifference { a, b } => {
                (bands[a] - bands[b]) / (bands[a] + bands[b] + EPSILON)
            }
            IndexFormula::SoilAdjusted { a, b, l } => {
                (1.0 + l) * (bands[a] - bands[b]) / (bands[a] + bands[b] + l + EPSILON)
            }
            IndexFormula::Ratio {
                numerator,
                denominator,
            } => bands[numerator] / (bands[denominator] + EPSILON),
            IndexFormula::Difference { a, b } => bands[a] - bands[b],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpectralIndex {
    pub name: &'static str,
    pub formula: IndexFormula,
}

/// Derived features, in the order they follow the raw bands.
pub const SPECTRAL_INDICES: [SpectralIndex; FEATURE_COUNT - BAND_COUNT] = [
    SpectralIndex {
        name: "nd_b10_b3",
        formula: IndexFormula::NormalizedDifference { a: 10, b: 3 },
    },
    SpectralIndex {
        name: "nd_b2_b10",
        formula: IndexFormula::NormalizedDifference { a: 2, b: 10 },
    },
    SpectralIndex {
        name: "soil_adjusted_b10_b3",
        formula: IndexFormula::SoilAdjusted {
            a: 10,
            b: 3,
            l: SOIL_ADJUSTMENT,
        },
    },
    SpectralIndex {
        name: "nd_b3_b2",
        formula: IndexFormula::NormalizedDifference { a: 3, b: 2 },
    },
    SpectralIndex {
        name: "ratio_b8_b9",
        formula: IndexFormula::Ratio {
            numerator: 8,
            denominator: 9,
        },
    },
    SpectralIndex {
        name: "ratio_b4_b5",
        formula: IndexFormula::Ratio {
            numerator: 4,
            denominator: 5,
        },
    },
    SpectralIndex {
        name: "diff_b8_b9",
        formula: IndexFormula::Difference { a: 8, b: 9 },
    },
];

/// Unstandardized feature vector for one pixel's reflectances.
pub fn raw_features(reflectance: &[f32; BAND_COUNT]) -> [f32; FEATURE_COUNT] {
    let mut features = [0.0f32; FEATURE_COUNT];
    features[..BAND_COUNT].copy_from_slice(reflectance);
    for (slot, index) in features[BAND_COUNT..].iter_mut().zip(SPECTRAL_INDICES.iter()) {
        *slot = index.formula.evaluate(reflectance);
    }
    features
}

/// Fill `out` (pixels x features) from `bands` (bands x pixels, raw digital numbers).
///
/// Every output cell is overwritten, so the same buffer can be handed in for
/// each block. A shape mismatch between the two views is a caller bug and panics.
pub fn compute_features_into(
    bands: ArrayView2<'_, f32>,
    scaler: &Scaler,
    mut out: ArrayViewMut2<'_, f32>,
) {
    assert_eq!(
        bands.nrows(),
        BAND_COUNT,
        "band block must hold {} bands",
        BAND_COUNT
    );
    let n_pixels = bands.ncols();
    assert_eq!(
        out.dim(),
        (n_pixels, FEATURE_COUNT),
        "feature matrix shape does not match the band block"
    );

    let (mean, scale) = scaler.narrowed();
    let mut reflectance = [0.0f32; BAND_COUNT];
    for (pixel, mut row) in bands.columns().into_iter().zip(out.rows_mut()) {
        for (r, &dn) in reflectance.iter_mut().zip(pixel.iter()) {
            *r = dn / REFLECTANCE_SCALE;
        }
        let features = raw_features(&reflectance);
        for (k, cell) in row.iter_mut().enumerate() {
            *cell = (features[k] - mean[k]) / scale[k];
        }
    }
}

/// Allocating variant of [`compute_features_into`].
pub fn compute_features(bands: ArrayView2<'_, f32>, scaler: &Scaler) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((bands.ncols(), FEATURE_COUNT));
    compute_features_into(bands, scaler, out.view_mut());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// Digital numbers for one pixel, band i = (i + 1) * 500.
    fn sample_dn() -> [f32; BAND_COUNT] {
        let mut dn = [0.0f32; BAND_COUNT];
        for (i, v) in dn.iter_mut().enumerate() {
            *v = (i as f32 + 1.0) * 500.0;
        }
        dn
    }

    fn block_from_pixels(pixels: &[[f32; BAND_COUNT]]) -> Array2<f32> {
        Array2::from_shape_fn((BAND_COUNT, pixels.len()), |(b, j)| pixels[j][b])
    }

    #[test]
    fn normalized_difference_matches_formula() {
        let mut b = [0.0f32; BAND_COUNT];
        b[10] = 0.5;
        b[3] = 0.1;
        let v = IndexFormula::NormalizedDifference { a: 10, b: 3 }.evaluate(&b);
        assert_relative_eq!(v, 0.4 / 0.6, epsilon = 1e-6);
    }

    #[test]
    fn soil_adjusted_matches_formula() {
        let mut b = [0.0f32; BAND_COUNT];
        b[10] = 0.5;
        b[3] = 0.1;
        let v = SPECTRAL_INDICES[2].formula.evaluate(&b);
        assert_relative_eq!(v, 1.5 * 0.4 / 1.1, epsilon = 1e-6);
    }

    #[test]
    fn ratio_and_difference_match_formula() {
        let mut b = [0.0f32; BAND_COUNT];
        b[8] = 0.3;
        b[9] = 0.2;
        b[4] = 0.9;
        b[5] = 0.3;
        assert_relative_eq!(SPECTRAL_INDICES[4].formula.evaluate(&b), 1.5, epsilon = 1e-6);
        assert_relative_eq!(SPECTRAL_INDICES[5].formula.evaluate(&b), 3.0, epsilon = 1e-6);
        assert_relative_eq!(SPECTRAL_INDICES[6].formula.evaluate(&b), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn index_table_uses_expected_bands() {
        let mut used: Vec<usize> = SPECTRAL_INDICES
            .iter()
            .flat_map(|idx| match idx.formula {
                IndexFormula::NormalizedDifference { a, b }
                | IndexFormula::SoilAdjusted { a, b, .. }
                | IndexFormula::Difference { a, b } => vec![a, b],
                IndexFormula::Ratio {
                    numerator,
                    denominator,
                } => vec![numerator, denominator],
            })
            .collect();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used, vec![2, 3, 4, 5, 8, 9, 10]);
    }

    #[test]
    fn identity_scaler_yields_raw_features() {
        let dn = sample_dn();
        let block = block_from_pixels(&[dn]);
        let out = compute_features(block.view(), &Scaler::identity());

        let mut reflectance = [0.0f32; BAND_COUNT];
        for (r, v) in reflectance.iter_mut().zip(dn.iter()) {
            *r = v / REFLECTANCE_SCALE;
        }
        let expected = raw_features(&reflectance);
        assert_eq!(out.dim(), (1, FEATURE_COUNT));
        for k in 0..FEATURE_COUNT {
            assert_eq!(out[[0, k]].to_bits(), expected[k].to_bits(), "feature {k}");
        }
        // first eleven are the scaled bands themselves
        assert_relative_eq!(out[[0, 0]], 0.05, epsilon = 1e-7);
        assert_relative_eq!(out[[0, 10]], 0.55, epsilon = 1e-7);
    }

    #[test]
    fn standardizes_with_scaler() {
        let block = block_from_pixels(&[sample_dn()]);
        let scaler = Scaler::new(vec![0.05; FEATURE_COUNT], vec![2.0; FEATURE_COUNT]).unwrap();
        let out = compute_features(block.view(), &scaler);
        let raw = compute_features(block.view(), &Scaler::identity());
        assert_relative_eq!(out[[0, 0]], 0.0, epsilon = 1e-7);
        for k in 0..FEATURE_COUNT {
            assert_relative_eq!(out[[0, k]], (raw[[0, k]] - 0.05) / 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_pixels_stay_finite() {
        let block = block_from_pixels(&[[0.0; BAND_COUNT], sample_dn()]);
        let out = compute_features(block.view(), &Scaler::identity());
        assert!(out.iter().all(|v| v.is_finite()));
        // 0 / eps
        assert_eq!(out[[0, BAND_COUNT]], 0.0);
        assert_eq!(out[[0, BAND_COUNT + 4]], 0.0);
    }

    #[test]
    fn pixels_are_laid_out_row_major() {
        let mut second = sample_dn();
        second[0] = 9000.0;
        let block = block_from_pixels(&[sample_dn(), second]);
        let out = compute_features(block.view(), &Scaler::identity());
        assert_eq!(out.dim(), (2, FEATURE_COUNT));
        assert_relative_eq!(out[[0, 0]], 0.05, epsilon = 1e-7);
        assert_relative_eq!(out[[1, 0]], 0.9, epsilon = 1e-7);
        let flat = out.as_slice().unwrap();
        assert_eq!(flat[FEATURE_COUNT], out[[1, 0]]);
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let pixels: Vec<[f32; BAND_COUNT]> = (0..64)
            .map(|j| {
                let mut dn = sample_dn();
                dn[j % BAND_COUNT] += j as f32 * 13.0;
                dn
            })
            .collect();
        let block = block_from_pixels(&pixels);
        let scaler = Scaler::new(vec![0.1; FEATURE_COUNT], vec![0.7; FEATURE_COUNT]).unwrap();

        let first = compute_features(block.view(), &scaler);
        let mut reused = Array2::<f32>::from_elem((64, FEATURE_COUNT), f32::NAN);
        compute_features_into(block.view(), &scaler, reused.view_mut());

        let a: Vec<u32> = first.iter().map(|v| v.to_bits()).collect();
        let b: Vec<u32> = reused.iter().map(|v| v.to_bits()).collect();
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "feature matrix shape")]
    fn mismatched_output_panics() {
        let block = block_from_pixels(&[sample_dn(), sample_dn()]);
        let mut out = Array2::<f32>::zeros((3, FEATURE_COUNT));
        compute_features_into(block.view(), &Scaler::identity(), out.view_mut());
    }
}
