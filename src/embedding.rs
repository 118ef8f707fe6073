
// imports
use crate::cooccurrence::CollocationCounts;

use ndarray::{Array2, ArrayView1, Axis, Zip};


/// Final embedding table, one row per token id.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingMatrix {
    w: Array2<f32>,
}

impl EmbeddingMatrix {

    /// Divides every accumulator row by the token's occurrence count. Tokens
    /// that never occurred keep an all-zero row.
    pub fn from_counts(counts: &CollocationCounts) -> EmbeddingMatrix {

        let mut w: Array2<f32> = Array2::zeros(counts.accumulator.raw_dim());

        Zip::from(w.axis_iter_mut(Axis(0)))
        .and(counts.accumulator.axis_iter(Axis(0)))
        .and(&counts.occurrences)
        .par_for_each(|mut row, acc, &count| {
            if count == 0 {
                return;
            }
            let count = count as f64;
            row.zip_mut_with(&acc, |out, a| *out = (*a as f64 / count) as f32);
        });

        Self { w }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.w.dim()
    }

    pub fn row(&self, token: usize) -> ArrayView1<'_, f32> {
        self.w.row(token)
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.w
    }

    pub fn into_array(self) -> Array2<f32> {
        self.w
    }

    /// Row-major little-endian f32 bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.w.len() * 4);
        // iter() walks the standard layout in logical row-major order
        for v in self.w.iter() {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }
}
