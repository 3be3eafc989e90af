use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layout string length {0} is not a perfect square")]
    NotSquare(usize),

    #[error("invalid character '{0}' in layout string at position {1}")]
    InvalidChar(char, usize),

    #[error("layout is not rotationally symmetric")]
    NotSymmetric,

    #[error("no valid border detected in layout")]
    NoBorder,

    #[error("invalid border: {0}")]
    InvalidBorder(String),
}

/// Errors returned synchronously from detector/family construction.
///
/// Never returned from `Detector::detect` — see [`InputError`] for that.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown tag family: {0}")]
    UnknownFamily(String),

    #[error("nthreads must be at least 1, got {0}")]
    InvalidThreadCount(usize),

    #[error("quad_decimate must be >= 1.0, got {0}")]
    InvalidDecimate(f32),
}

/// Errors returned from `Detector::detect` for malformed input images.
///
/// Never returned for "no tag present" or any other detection outcome —
/// that degrades silently to an empty detection list.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("image has zero width or height")]
    EmptyImage,

    #[error("image stride {stride} is smaller than its width {width}")]
    StrideTooSmall { width: u32, stride: u32 },

    #[error(
        "image {width}x{height} is smaller than the minimum {min}x{min} required \
         by a registered family"
    )]
    TooSmall { width: u32, height: u32, min: u32 },
}
