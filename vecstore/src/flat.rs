use std::collections::HashMap;

use crate::error::VecError;
use crate::l2::squared_l2;
use crate::vecstore::{Match, VecIndex};

/// FlatIndex is an exact brute-force index over a contiguous f32 buffer.
/// Every search scans all rows, so a query costs O(N·dim).
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    ids: Vec<String>,
    data: Vec<f32>,
    positions: HashMap<String, usize>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Result<Self, VecError> {
        if dim == 0 {
            return Err(VecError::ZeroDimension);
        }
        Ok(Self {
            dim,
            ids: Vec::new(),
            data: Vec::new(),
            positions: HashMap::new(),
        })
    }

    pub fn with_capacity(dim: usize, capacity: usize) -> Result<Self, VecError> {
        let mut idx = Self::new(dim)?;
        idx.ids.reserve(capacity);
        idx.data.reserve(capacity * dim);
        idx.positions.reserve(capacity);
        Ok(idx)
    }

    /// Return the IDs in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    fn check(&self, v: &[f32]) -> Result<(), VecError> {
        if v.len() != self.dim {
            return Err(VecError::DimensionMismatch {
                got: v.len(),
                want: self.dim,
            });
        }
        if let Some(i) = v.iter().position(|x| !x.is_finite()) {
            return Err(VecError::NonFinite(i));
        }
        Ok(())
    }
}

impl VecIndex for FlatIndex {
    fn insert(&mut self, id: &str, vector: &[f32]) -> Result<(), VecError> {
        self.check(vector)?;
        match self.positions.get(id) {
            Some(&i) => {
                self.data[i * self.dim..(i + 1) * self.dim].copy_from_slice(vector);
            }
            None => {
                self.positions.insert(id.to_string(), self.ids.len());
                self.ids.push(id.to_string());
                self.data.extend_from_slice(vector);
            }
        }
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Match>, VecError> {
        self.check(query)?;
        if self.ids.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<(usize, f32)> = (0..self.ids.len())
            .map(|i| (i, squared_l2(query, self.row(i))))
            .collect();

        // Stable sort keeps insertion order among equal distances.
        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        Ok(results
            .into_iter()
            .map(|(i, distance)| Match {
                id: self.ids[i].clone(),
                distance,
            })
            .collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
