//! On-disk cache of computed impedances and synthesized sounds.
//!
//! Files are named `<stem>_<key>.<ext>` where the key is a SHA-256 digest of
//! everything the result depends on, so a changed geometry, temperature or
//! solver setting never reuses a stale file.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::acoustics::{FrequencySolver, InstrumentPhysics, LipModel, TemporalOptions};
use crate::domain::ImpedanceCurve;
use crate::error::AppError;
use crate::io::geometry_file::{WriteOptions, format_geometry};
use crate::io::impedance_file::{read_impedance, write_impedance};

/// Hex digest identifying one computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    fn physics_hasher(physics: &InstrumentPhysics, solver: &str) -> Sha256 {
        let canonical = format_geometry(
            physics.geometry(),
            &WriteOptions {
                digits: 17,
                display_optim: false,
            },
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher.update(physics.temperature().to_le_bytes());
        hasher.update(physics.losses().keyword().as_bytes());
        hasher.update(physics.radiation().keyword().as_bytes());
        hasher.update(solver.as_bytes());
        hasher
    }

    pub fn for_impedance<S: FrequencySolver + ?Sized>(physics: &InstrumentPhysics, solver: &S, freqs: &[f64]) -> Self {
        let mut hasher = Self::physics_hasher(physics, &solver.describe());
        hasher.update(b"impedance");
        for f in freqs {
            hasher.update(f.to_le_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn for_sound<S: FrequencySolver + ?Sized>(
        physics: &InstrumentPhysics,
        solver: &S,
        player: &LipModel,
        temporal: &TemporalOptions,
        duration: f64,
    ) -> Result<Self, AppError> {
        let mut hasher = Self::physics_hasher(physics, &solver.describe());
        hasher.update(b"sound");
        let player = serde_json::to_string(player).map_err(|e| AppError::numeric(format!("Cannot hash player: {e}")))?;
        let temporal =
            serde_json::to_string(temporal).map_err(|e| AppError::numeric(format!("Cannot hash options: {e}")))?;
        hasher.update(player.as_bytes());
        hasher.update(temporal.as_bytes());
        hasher.update(duration.to_le_bytes());
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex digits, used in file names.
    pub fn short(&self) -> &str {
        &self.0[..16.min(self.0.len())]
    }
}

#[derive(Debug, Clone)]
pub struct ImpedanceCache {
    dir: PathBuf,
}

impl ImpedanceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stem: &str, key: &CacheKey, ext: &str) -> PathBuf {
        self.dir.join(format!("{stem}_{}.{ext}", key.short()))
    }

    /// Path of a cached sound; callers synthesize and write it when absent.
    pub fn sound_path(&self, stem: &str, key: &CacheKey) -> PathBuf {
        self.path_for(stem, key, "wav")
    }

    pub fn ensure_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| AppError::write(&self.dir, e))
    }

    /// Read the cached impedance of `physics` on `freqs`, or solve and store it.
    pub fn get_or_compute<S: FrequencySolver + ?Sized>(
        &self,
        stem: &str,
        physics: &InstrumentPhysics,
        solver: &S,
        freqs: &[f64],
    ) -> Result<ImpedanceCurve, AppError> {
        let key = CacheKey::for_impedance(physics, solver, freqs);
        let path = self.path_for(stem, &key, "txt");
        if path.is_file() {
            info!(path = %path.display(), "impedance cache hit");
            return read_impedance(&path);
        }
        let curve = solver.impedance(physics, freqs)?;
        self.ensure_dir()?;
        write_impedance(&path, &curve, true)?;
        info!(path = %path.display(), "impedance computed and cached");
        Ok(curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::{LossModel, Radiation, TransferMatrixSolver};
    use crate::geometry::BoreGeometry;
    use crate::math::arange;

    fn physics(temperature: f64) -> InstrumentPhysics {
        let g = BoreGeometry::from_points(&[(0.0, 0.008), (0.5, 0.02)]).unwrap();
        InstrumentPhysics::new(g, temperature, LossModel::BoundaryLayer, Radiation::Unflanged)
    }

    #[test]
    fn keys_follow_every_input() {
        let solver = TransferMatrixSolver::default();
        let freqs = arange(50.0, 60.0, 1.0);
        let a = CacheKey::for_impedance(&physics(20.0), &solver, &freqs);
        assert_eq!(a, CacheKey::for_impedance(&physics(20.0), &solver, &freqs));
        assert_ne!(a, CacheKey::for_impedance(&physics(25.0), &solver, &freqs));
        assert_ne!(a, CacheKey::for_impedance(&physics(20.0), &TransferMatrixSolver::new(1e-3), &freqs));
        assert_ne!(a, CacheKey::for_impedance(&physics(20.0), &solver, &freqs[1..]));
        assert_eq!(a.short().len(), 16);

        let lips = LipModel::default();
        let mut other = lips.clone();
        other.set_lip_frequency(300.0);
        let opts = TemporalOptions::default();
        let s = CacheKey::for_sound(&physics(20.0), &solver, &lips, &opts, 1.0).unwrap();
        assert_ne!(s, CacheKey::for_sound(&physics(20.0), &solver, &other, &opts, 1.0).unwrap());
        assert_ne!(s, a);
    }

    #[test]
    fn second_request_reads_the_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImpedanceCache::new(dir.path().join("cache"));
        let solver = TransferMatrixSolver::default();
        let freqs = arange(50.0, 500.0, 5.0);
        let phy = physics(20.0);

        let first = cache.get_or_compute("bore", &phy, &solver, &freqs).unwrap();
        let key = CacheKey::for_impedance(&phy, &solver, &freqs);
        assert!(cache.path_for("bore", &key, "txt").is_file());

        let second = cache.get_or_compute("bore", &phy, &solver, &freqs).unwrap();
        assert_eq!(first, second);
    }
}
