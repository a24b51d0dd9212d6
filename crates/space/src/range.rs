//! Thread ranges, range modifiers, and device-side limits.

use crate::SpaceError;
use serde::{Deserialize, Serialize};

/// A 1- to 3-dimensional thread range (global or local).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdRange {
    sizes: Vec<usize>,
}

impl NdRange {
    pub fn new(sizes: &[usize]) -> Result<Self, SpaceError> {
        if sizes.is_empty() || sizes.len() > 3 {
            return Err(SpaceError::BadDimensionCount(sizes.len()));
        }
        Ok(Self {
            sizes: sizes.to_vec(),
        })
    }

    pub fn dims(&self) -> usize {
        self.sizes.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Total thread count over all dimensions.
    pub fn product(&self) -> usize {
        self.sizes.iter().product()
    }

    pub(crate) fn get(&self, dim: usize) -> usize {
        self.sizes[dim]
    }

    pub(crate) fn set(&mut self, dim: usize, value: usize) {
        self.sizes[dim] = value;
    }
}

/// Whether a modifier rewrites the global or the local thread range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeTarget {
    Global,
    Local,
}

/// How a modifier combines a parameter value with a range dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierKind {
    Mul,
    Div,
    Set,
}

/// A directive that rewrites the base thread ranges per configuration. Each
/// named parameter applies to one dimension, in order: the first name to
/// dimension 0, the second to dimension 1, and so on.
#[derive(Debug, Clone)]
pub struct RangeModifier {
    pub target: RangeTarget,
    pub kind: ModifierKind,
    pub names: Vec<String>,
}

impl RangeModifier {
    pub fn new(target: RangeTarget, kind: ModifierKind, names: &[&str]) -> Self {
        Self {
            target,
            kind,
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Device capabilities relevant to thread-range and memory feasibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_work_group_size: usize,
    pub max_work_item_sizes: [usize; 3],
    pub max_work_item_dimensions: usize,
    pub local_memory_bytes: u64,
}

impl DeviceLimits {
    /// Checks a fully modified global/local range pair against the limits.
    pub fn check_ranges(&self, global: &NdRange, local: &NdRange) -> Result<(), SpaceError> {
        if local.dims() > self.max_work_item_dimensions {
            return Err(SpaceError::TooManyDimensions {
                requested: local.dims(),
                limit: self.max_work_item_dimensions,
            });
        }
        for dim in 0..local.dims() {
            let size = local.get(dim);
            if size == 0 {
                return Err(SpaceError::ZeroLocalSize(dim));
            }
            if size > self.max_work_item_sizes[dim] {
                return Err(SpaceError::WorkItemTooLarge {
                    dim,
                    requested: size,
                    limit: self.max_work_item_sizes[dim],
                });
            }
        }
        if local.product() > self.max_work_group_size {
            return Err(SpaceError::WorkGroupTooLarge {
                requested: local.product(),
                limit: self.max_work_group_size,
            });
        }
        for dim in 0..global.dims().min(local.dims()) {
            let g = global.get(dim);
            let l = local.get(dim);
            if g == 0 || g % l != 0 {
                return Err(SpaceError::IndivisibleRange {
                    dim,
                    global: g,
                    local: l,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits {
            max_work_group_size: 256,
            max_work_item_sizes: [256, 256, 64],
            max_work_item_dimensions: 3,
            local_memory_bytes: 32 * 1024,
        }
    }

    #[test]
    fn range_dimension_bounds() {
        assert!(NdRange::new(&[]).is_err());
        assert!(NdRange::new(&[1, 2, 3, 4]).is_err());
        assert_eq!(NdRange::new(&[64, 32]).unwrap().product(), 2048);
    }

    #[test]
    fn rejects_indivisible_global() {
        let global = NdRange::new(&[100]).unwrap();
        let local = NdRange::new(&[32]).unwrap();
        assert!(matches!(
            limits().check_ranges(&global, &local),
            Err(SpaceError::IndivisibleRange { .. })
        ));
    }

    #[test]
    fn rejects_oversized_work_group() {
        let global = NdRange::new(&[512, 512]).unwrap();
        let local = NdRange::new(&[32, 32]).unwrap();
        assert!(matches!(
            limits().check_ranges(&global, &local),
            Err(SpaceError::WorkGroupTooLarge { .. })
        ));
    }

    #[test]
    fn accepts_exact_fit() {
        let global = NdRange::new(&[512, 512]).unwrap();
        let local = NdRange::new(&[16, 16]).unwrap();
        assert!(limits().check_ranges(&global, &local).is_ok());
    }
}
