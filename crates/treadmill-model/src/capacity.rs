//! Fixed 3-dimensional capacity vector: memory (MB), cpu (units), disk (MB).

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Capacity {
    pub memory_mb: i64,
    pub cpu_units: i64,
    pub disk_mb: i64,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity {
        memory_mb: 0,
        cpu_units: 0,
        disk_mb: 0,
    };

    pub fn new(memory_mb: i64, cpu_units: i64, disk_mb: i64) -> Self {
        Self {
            memory_mb,
            cpu_units,
            disk_mb,
        }
    }

    /// Componentwise `self >= other`.
    pub fn covers(&self, other: &Capacity) -> bool {
        self.memory_mb >= other.memory_mb
            && self.cpu_units >= other.cpu_units
            && self.disk_mb >= other.disk_mb
    }

    /// Componentwise `self >= 0`.
    pub fn is_non_negative(&self) -> bool {
        self.memory_mb >= 0 && self.cpu_units >= 0 && self.disk_mb >= 0
    }

    /// Fraction of each dimension used, assuming `self` is total capacity
    /// and `used` is demand already placed. Each ratio is in `[0, 1]`
    /// when `used` fits within `self`; used only for ranking, so values
    /// outside that range are left as-is rather than clamped.
    pub fn utilization(&self, used: &Capacity) -> f64 {
        let ratios = [
            ratio(used.memory_mb, self.memory_mb),
            ratio(used.cpu_units, self.cpu_units),
            ratio(used.disk_mb, self.disk_mb),
        ];
        ratios.iter().cloned().fold(0.0, f64::max)
    }
}

fn ratio(used: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        used as f64 / total as f64
    }
}

impl Add for Capacity {
    type Output = Capacity;
    fn add(self, rhs: Capacity) -> Capacity {
        Capacity {
            memory_mb: self.memory_mb + rhs.memory_mb,
            cpu_units: self.cpu_units + rhs.cpu_units,
            disk_mb: self.disk_mb + rhs.disk_mb,
        }
    }
}

impl Sub for Capacity {
    type Output = Capacity;
    fn sub(self, rhs: Capacity) -> Capacity {
        Capacity {
            memory_mb: self.memory_mb - rhs.memory_mb,
            cpu_units: self.cpu_units - rhs.cpu_units,
            disk_mb: self.disk_mb - rhs.disk_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_is_componentwise() {
        let a = Capacity::new(16000, 8000, 100000);
        let b = Capacity::new(1000, 100, 1000);
        assert!(a.covers(&b));
        assert!(!b.covers(&a));
    }

    #[test]
    fn free_capacity_after_placement() {
        let total = Capacity::new(16000, 8000, 100000);
        let demand = Capacity::new(1000, 100, 1000);
        let free = total - demand;
        assert_eq!(free, Capacity::new(15000, 7900, 99000));
        assert!(free.is_non_negative());
    }

    #[test]
    fn utilization_takes_the_max_dimension() {
        let total = Capacity::new(1000, 1000, 1000);
        let used = Capacity::new(500, 100, 900);
        assert!((total.utilization(&used) - 0.9).abs() < 1e-9);
    }
}
