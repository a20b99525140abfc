//! Interpolation methods and table cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

use grid_common::GridId;

use crate::error::{Result, TableError};

/// Spatial interpolation method with its parameters.
///
/// `max_radius` is the search radius in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Closest source point within the radius.
    Nearest { max_radius: f64 },
    /// `neighbours` closest source points within the radius, weighted by
    /// `1 / distance^power`.
    #[serde(rename = "idw")]
    InverseDistance {
        neighbours: usize,
        power: f64,
        max_radius: f64,
    },
}

impl InterpolationMethod {
    /// Short method name used in logs and file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest { .. } => "nearest",
            Self::InverseDistance { .. } => "idw",
        }
    }

    pub fn max_radius(&self) -> f64 {
        match self {
            Self::Nearest { max_radius } | Self::InverseDistance { max_radius, .. } => *max_radius,
        }
    }

    /// Maximum number of source points per target cell.
    pub fn neighbours(&self) -> usize {
        match self {
            Self::Nearest { .. } => 1,
            Self::InverseDistance { neighbours, .. } => *neighbours,
        }
    }

    /// Canonical parameter tag, e.g. `k4_p2_r50000`.
    pub fn params_tag(&self) -> String {
        match self {
            Self::Nearest { max_radius } => format!("r{}", max_radius),
            Self::InverseDistance {
                neighbours,
                power,
                max_radius,
            } => format!("k{}_p{}_r{}", neighbours, power, max_radius),
        }
    }

    /// Range checks on the parameters.
    pub fn validate(&self) -> Result<()> {
        let radius = self.max_radius();
        if !radius.is_finite() || radius <= 0.0 {
            return Err(TableError::InvalidParams(format!(
                "max_radius must be a positive number of metres, got {}",
                radius
            )));
        }
        if let Self::InverseDistance {
            neighbours, power, ..
        } = self
        {
            if *neighbours == 0 {
                return Err(TableError::InvalidParams(
                    "idw needs at least one neighbour".to_string(),
                ));
            }
            if !power.is_finite() || *power <= 0.0 {
                return Err(TableError::InvalidParams(format!(
                    "idw power must be positive, got {}",
                    power
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.params_tag())
    }
}

/// Cache key of an interpolation table:
/// `(source GridId, target id, method, params)`.
///
/// Equality and hashing go through the canonical file stem, so two keys are
/// equal exactly when they would share a file on disk.
#[derive(Debug, Clone)]
pub struct TableKey {
    pub source: GridId,
    pub target: String,
    pub method: InterpolationMethod,
    stem: String,
}

impl TableKey {
    pub fn new(source: GridId, target: impl Into<String>, method: InterpolationMethod) -> Self {
        let target = target.into();
        let stem = format!(
            "tbl_{}_{}_{}_{}",
            source,
            sanitize(&target),
            method.name(),
            method.params_tag()
        );
        Self {
            source,
            target,
            method,
            stem,
        }
    }

    /// File name of the persisted table. A pure function of the key.
    pub fn file_name(&self) -> String {
        format!("{}.itab.gz", self.stem)
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.stem == other.stem
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stem.hash(state);
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem)
    }
}

/// File-name-safe form of a target id. Ids that need rewriting get a short
/// hash of the raw id appended, so distinct ids keep distinct stems.
fn sanitize(id: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.';
    if !id.is_empty() && id.chars().all(safe) {
        return id.to_string();
    }
    let cleaned: String = id.chars().map(|c| if safe(c) { c } else { '-' }).collect();
    let digest = Sha256::digest(id.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", cleaned, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idw() -> InterpolationMethod {
        InterpolationMethod::InverseDistance {
            neighbours: 4,
            power: 2.0,
            max_radius: 50_000.0,
        }
    }

    #[test]
    fn test_file_name_is_pure() {
        let a = TableKey::new(GridId::from_raw("abc123"), "efas 5km", idw());
        let b = TableKey::new(GridId::from_raw("abc123"), "efas 5km", idw());
        assert_eq!(a, b);
        assert_eq!(a.file_name(), b.file_name());

        let plain = TableKey::new(GridId::from_raw("abc123"), "efas-5km", idw());
        assert_eq!(plain.file_name(), "tbl_abc123_efas-5km_idw_k4_p2_r50000.itab.gz");
    }

    #[test]
    fn test_rewritten_target_ids_stay_distinct() {
        let space = TableKey::new(GridId::from_raw("abc123"), "efas 5km", idw());
        let slash = TableKey::new(GridId::from_raw("abc123"), "efas/5km", idw());
        let plain = TableKey::new(GridId::from_raw("abc123"), "efas-5km", idw());
        assert_ne!(space, slash);
        assert_ne!(space, plain);
        assert!(space.stem().starts_with("tbl_abc123_efas-5km-"));
        assert!(!space.stem().contains(' '));
        assert!(!slash.stem().contains('/'));
    }

    #[test]
    fn test_keys_differ_by_params() {
        let a = TableKey::new(GridId::from_raw("abc"), "t", idw());
        let b = TableKey::new(
            GridId::from_raw("abc"),
            "t",
            InterpolationMethod::InverseDistance {
                neighbours: 8,
                power: 2.0,
                max_radius: 50_000.0,
            },
        );
        let c = TableKey::new(
            GridId::from_raw("abc"),
            "t",
            InterpolationMethod::Nearest {
                max_radius: 50_000.0,
            },
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_validate() {
        assert!(idw().validate().is_ok());
        assert!(InterpolationMethod::Nearest { max_radius: 0.0 }
            .validate()
            .is_err());
        assert!(InterpolationMethod::InverseDistance {
            neighbours: 0,
            power: 2.0,
            max_radius: 1.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_method_from_yaml_like_json() {
        let json = r#"{"method":"idw","neighbours":4,"power":2.0,"max_radius":50000.0}"#;
        let method: InterpolationMethod = serde_json::from_str(json).unwrap();
        assert_eq!(method, idw());
    }
}
