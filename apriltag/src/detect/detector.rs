use crate::error::{ConfigError, InputError};
use crate::family::TagFamily;

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use super::cluster::gradient_clusters;
use super::connected::connected_components;
use super::contour;
use super::decode::{decode_quad, QuickDecode};
use super::dedup::deduplicate;
use super::homography::Homography;
use super::image::ImageU8;
use super::preprocess::{apply_sigma, decimate};
use super::quad::{fit_quads, Quad, QuadThreshParams};
use super::refine::{refine_decode, refine_edges};
use super::threshold::threshold;

/// Why a candidate quad did not become a `Detection`.
///
/// Exists purely for `debug`-mode logging; never returned as an error, and
/// never constructed on the non-debug path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The quad's corners produced a near-singular homography.
    DegenerateHomography,
    /// No registered family's border polarity matched the quad.
    BorderMismatch,
    /// The sampled code didn't match any entry within the configured max Hamming distance.
    HammingTooLarge,
}

/// A detected AprilTag in an image.
#[derive(Debug, Clone)]
pub struct Detection {
    pub family_name: String,
    pub id: i32,
    pub hamming: i32,
    /// Opaque, non-negative quad-fit quality; higher means a cleaner quad
    /// geometry (see [`Quad::goodness`]). Not comparable in absolute terms
    /// across the gradient-clustering and contour quad-discovery paths.
    pub goodness: f32,
    pub decision_margin: f32,
    pub corners: [[f64; 2]; 4],
    pub center: [f64; 2],
}

/// Detector configuration.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub quad_decimate: f32,
    pub quad_sigma: f32,
    pub refine_edges: bool,
    pub decode_sharpening: f64,
    pub qtp: QuadThreshParams,
    /// Number of worker threads used for per-quad decoding.
    ///
    /// Only has an effect when built with the `parallel` feature; `1` always
    /// runs the sequential path regardless of feature selection.
    pub nthreads: usize,
    /// Emit `log::debug!`/`log::trace!` diagnostics for each pipeline stage.
    pub debug: bool,
    /// Use contour tracing (`contour::find_quads`) instead of gradient-based
    /// clustering (`cluster::gradient_clusters`) for quad discovery.
    pub use_contours: bool,
    /// Re-attempt decoding with a perturbed sampling homography, keeping
    /// whichever attempt has the higher decision margin.
    pub refine_decode: bool,
    /// Consulted by [`pose_from_detection`](super::pose::pose_from_detection):
    /// when set, callers should pass `refine: true` to run orthogonal
    /// iteration and the second-minimum search instead of the closed-form
    /// homography decomposition.
    pub refine_pose: bool,
    /// Minimum quiet-zone border, in decimated pixels, required around a
    /// candidate tag. Folded into the minimum-image-size check.
    pub border: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            quad_decimate: 2.0,
            quad_sigma: 0.0,
            refine_edges: true,
            decode_sharpening: 0.25,
            qtp: QuadThreshParams::default(),
            nthreads: 1,
            debug: false,
            use_contours: false,
            refine_decode: false,
            refine_pose: false,
            border: 1,
        }
    }
}

impl DetectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.nthreads < 1 {
            return Err(ConfigError::InvalidThreadCount(self.nthreads));
        }
        if self.quad_decimate < 1.0 {
            return Err(ConfigError::InvalidDecimate(self.quad_decimate));
        }
        Ok(())
    }
}

/// An AprilTag detector with pre-built lookup tables.
pub struct Detector {
    pub config: DetectorConfig,
    families: Vec<(TagFamily, QuickDecode)>,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Detector {
    /// Create a new detector with the given configuration.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        #[cfg(feature = "parallel")]
        let pool = if config.nthreads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.nthreads)
                .build()
                .ok()
        } else {
            None
        };

        Ok(Self {
            config,
            families: Vec::new(),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Add a tag family to the detector with the given maximum Hamming distance.
    pub fn add_family(&mut self, family: TagFamily, maxhamming: u32) {
        log::debug!(
            "adding family {} (nbits={}, maxhamming={maxhamming})",
            family.config.name,
            family.layout.nbits
        );
        let qd = QuickDecode::new(&family, maxhamming);
        self.families.push((family, qd));
    }

    /// Validate that an image is well-formed and large enough for every
    /// registered family before running the pipeline.
    fn validate_input(&self, img: &ImageU8) -> Result<(), InputError> {
        if img.width == 0 || img.height == 0 {
            return Err(InputError::EmptyImage);
        }
        if img.stride < img.width {
            return Err(InputError::StrideTooSmall {
                width: img.width,
                stride: img.stride,
            });
        }
        let min = self
            .families
            .iter()
            .map(|(f, _)| {
                let d_side = (f.layout.nbits as f64).sqrt().round() as u32;
                2 * (d_side + 2 * self.config.border) + 8
            })
            .max()
            .unwrap_or(0);
        if min > 0 && (img.width < min || img.height < min) {
            return Err(InputError::TooSmall {
                width: img.width,
                height: img.height,
                min,
            });
        }
        Ok(())
    }

    /// Detect tags in a grayscale image.
    ///
    /// Returns an [`InputError`] for malformed input; an image with no tags
    /// present simply yields an empty, non-error result.
    pub fn detect(&self, img: &ImageU8) -> Result<Vec<Detection>, InputError> {
        self.validate_input(img)?;

        #[cfg(feature = "parallel")]
        {
            if let Some(pool) = &self.pool {
                return Ok(pool.install(|| self.detect_inner(img)));
            }
        }
        Ok(self.detect_inner(img))
    }

    fn detect_inner(&self, img: &ImageU8) -> Vec<Detection> {
        let f = self.config.quad_decimate as u32;

        // Stage 1: Preprocess
        let decimated = decimate(img, f);
        let filtered = apply_sigma(&decimated, self.config.quad_sigma);
        if self.config.debug {
            log::trace!(
                "decimated to {}x{}, sigma={}",
                filtered.width,
                filtered.height,
                self.config.quad_sigma
            );
        }

        // Stage 2: Threshold
        let threshed = threshold(
            &filtered,
            self.config.qtp.min_white_black_diff,
            self.config.qtp.deglitch,
        );

        let has_normal = self.families.iter().any(|(f, _)| !f.layout.reversed_border);
        let has_reversed = self.families.iter().any(|(f, _)| f.layout.reversed_border);

        // Stage 3-5: quad discovery, either gradient clustering or contour tracing
        let mut quads = if self.config.use_contours {
            let mut quads = Vec::new();
            if has_normal {
                quads.extend(contour::find_quads(&threshed, &self.config.qtp, false));
            }
            if has_reversed {
                quads.extend(contour::find_quads(&threshed, &self.config.qtp, true));
            }
            quads
        } else {
            let mut uf = connected_components(&threshed);
            let mut clusters = gradient_clusters(
                &threshed,
                &mut uf,
                self.config.qtp.min_cluster_pixels as u32,
            );
            fit_quads(
                &mut clusters,
                filtered.width,
                filtered.height,
                &self.config.qtp,
                has_normal,
                has_reversed,
            )
        };
        if self.config.debug {
            log::debug!("found {} candidate quads", quads.len());
        }

        // Scale quad corners back to original image coordinates
        if f > 1 {
            for quad in &mut quads {
                for corner in &mut quad.corners {
                    corner[0] *= f as f64;
                    corner[1] *= f as f64;
                }
            }
        }

        // Stage 6: Edge refinement
        if self.config.refine_edges {
            for quad in &mut quads {
                refine_edges(quad, img, self.config.quad_decimate);
            }
        }

        // Stages 7-8: Homography + Decode
        let decode_one = |quad: &Quad| -> Vec<Detection> {
            let h = match Homography::from_quad_corners(&quad.corners) {
                Some(h) => h,
                None => {
                    if self.config.debug {
                        log::trace!("quad rejected: {:?}", RejectReason::DegenerateHomography);
                    }
                    return Vec::new();
                }
            };

            let mut dets = Vec::new();
            let mut any_family_matched = false;
            for (family, qd) in &self.families {
                if quad.reversed_border != family.layout.reversed_border {
                    continue;
                }
                any_family_matched = true;

                let result = if self.config.refine_decode {
                    refine_decode(img, family, qd, quad, self.config.decode_sharpening)
                } else {
                    decode_quad(
                        img,
                        family,
                        qd,
                        &h,
                        quad.reversed_border,
                        self.config.decode_sharpening,
                    )
                };

                if let Some(result) = result {
                    let (center, corners) =
                        compute_detection_geometry(&h, result.rotation, family);

                    dets.push(Detection {
                        family_name: result.family_name,
                        id: result.id,
                        hamming: result.hamming,
                        goodness: quad.goodness,
                        decision_margin: result.decision_margin,
                        corners,
                        center,
                    });
                } else if self.config.debug {
                    log::trace!("quad rejected: {:?}", RejectReason::HammingTooLarge);
                }
            }
            if !any_family_matched && self.config.debug {
                log::trace!("quad rejected: {:?}", RejectReason::BorderMismatch);
            }
            dets
        };

        #[cfg(feature = "parallel")]
        let mut detections: Vec<Detection> = quads.par_iter().flat_map(decode_one).collect();

        #[cfg(not(feature = "parallel"))]
        let mut detections: Vec<Detection> = quads.iter().flat_map(decode_one).collect();

        // Stage 9: Deduplication
        let before = detections.len();
        deduplicate(&mut detections);
        if self.config.debug && detections.len() != before {
            log::debug!("deduplication removed {} detections", before - detections.len());
        }

        detections.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then(a.center[1].total_cmp(&b.center[1]))
                .then(a.center[0].total_cmp(&b.center[0]))
        });

        detections
    }
}

/// Compute center and rotation-corrected corner positions.
fn compute_detection_geometry(
    h: &Homography,
    rotation: i32,
    _family: &TagFamily,
) -> ([f64; 2], [[f64; 2]; 4]) {
    let (cx, cy) = h.project(0.0, 0.0);

    // Tag corners in canonical order, rotated by the detected rotation
    let base_corners = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
    let mut corners = [[0.0f64; 2]; 4];
    for i in 0..4 {
        let src = &base_corners[(i + rotation as usize) % 4];
        let (px, py) = h.project(src[0], src[1]);
        corners[i] = [px, py];
    }

    ([cx, cy], corners)
}
