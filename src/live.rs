//! The live transform: last valid settings and the matrices derived from them
//!
//! Every update produces a fresh [`Snapshot`] that replaces the previous one
//! whole. Readers load the current snapshot without locking. An update that
//! fails validation or hits a singular system leaves the previous snapshot in
//! place, so renderers keep drawing the last good transform.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adjustments::Adjustments;
use crate::config::MediaConfig;
use crate::error::UpdateError;
use crate::geometry::{Corner, CornerSet, Point2D};
use crate::settings::TransformSettings;
use crate::transform::{AffineApprox, HomographyMatrix, Mesh};

/// Everything derived from one settings document
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub settings: TransformSettings,
    pub media: MediaConfig,
    /// Media rectangle onto the dragged corners
    pub matrix: HomographyMatrix,
    /// `matrix` followed by rotation/scale about the frame center
    pub composed: HomographyMatrix,
    /// Affine approximation of `composed`, with its loss
    pub affine: AffineApprox,
    /// Bumped on every accepted update
    pub revision: u64,
}

impl Snapshot {
    /// Validate and solve; pure apart from the revision number
    pub fn compute(
        media: MediaConfig,
        settings: TransformSettings,
        revision: u64,
    ) -> Result<Self, UpdateError> {
        settings.validate()?;

        let source = media.source_corners();
        let matrix = HomographyMatrix::from_corners(&source, &settings.corners())?;
        let composed = Adjustments::from(&settings).compose(&matrix, media.width, media.height)?;
        let affine = composed.affine_approx(&source);

        Ok(Self {
            settings,
            media,
            matrix,
            composed,
            affine,
            revision,
        })
    }

    pub fn corners(&self) -> CornerSet {
        self.settings.corners()
    }

    /// Projective mesh of the composed transform over the media rectangle
    pub fn mesh(&self, cols: u32, rows: u32) -> Result<Mesh, UpdateError> {
        Ok(Mesh::build(
            &self.composed,
            self.media.width as f64,
            self.media.height as f64,
            cols,
            rows,
        )?)
    }
}

/// An update that was not applied, with the snapshot still in effect
#[derive(Debug, Clone)]
pub struct Rejected {
    pub error: UpdateError,
    pub current: Arc<Snapshot>,
}

/// Holder of the current snapshot
pub struct LiveTransform {
    media: MediaConfig,
    defaults: TransformSettings,
    current: ArcSwap<Snapshot>,
    /// Serializes writers so read-modify-write updates do not interleave
    write_lock: Mutex<()>,
}

impl LiveTransform {
    /// Start from `defaults`; fails if the defaults themselves do not solve
    pub fn new(media: MediaConfig, defaults: TransformSettings) -> Result<Self, UpdateError> {
        let snapshot = Snapshot::compute(media, defaults, 0)?;
        Ok(Self {
            media,
            defaults,
            current: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    pub fn media(&self) -> MediaConfig {
        self.media
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Replace the settings wholesale
    pub fn update(&self, settings: TransformSettings) -> Result<Arc<Snapshot>, Rejected> {
        let _guard = self.write_lock.lock();
        self.apply(settings)
    }

    /// Move one corner of the current settings
    pub fn drag(&self, corner: Corner, point: Point2D) -> Result<Arc<Snapshot>, Rejected> {
        let _guard = self.write_lock.lock();
        let current = self.current.load_full();
        let corners = current.corners().with_corner(corner, point);
        let settings = current.settings.with_corners(&corners);
        self.apply(settings)
    }

    /// Back to the configured defaults
    pub fn reset(&self) -> Arc<Snapshot> {
        let _guard = self.write_lock.lock();
        match self.apply(self.defaults) {
            Ok(snapshot) => snapshot,
            // Defaults solved in new(); keep whatever is current if that ever changes
            Err(rejected) => rejected.current,
        }
    }

    fn apply(&self, settings: TransformSettings) -> Result<Arc<Snapshot>, Rejected> {
        let previous = self.current.load_full();
        match Snapshot::compute(self.media, settings, previous.revision + 1) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.current.store(snapshot.clone());
                debug!(revision = snapshot.revision, "transform updated");
                Ok(snapshot)
            }
            Err(error) => {
                warn!(%error, revision = previous.revision, "keeping previous transform");
                Err(Rejected {
                    error,
                    current: previous,
                })
            }
        }
    }
}
