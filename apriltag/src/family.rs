use crate::bits::{self, BitLocation};
use crate::error::LayoutError;
use crate::layout::Layout;

/// Family configuration: name, error-correction radius, and layout shape.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct FamilyConfig {
    pub name: String,
    pub min_hamming: u32,
    /// Per-family complexity parameter, reserved for alternate codebook
    /// generation strategies; unused by the built-in synthetic codebooks.
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_complexity: Option<u32>,
    pub layout: LayoutConfig,
}

/// Layout configuration variant.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum LayoutConfig {
    Classic { grid_size: usize },
    Standard { grid_size: usize },
    Circle { grid_size: usize },
    Custom { grid_size: usize, data: String },
}

/// A fully loaded tag family with config, layout, codes, and computed fields.
#[derive(Debug, Clone)]
pub struct TagFamily {
    pub config: FamilyConfig,
    pub layout: Layout,
    pub codes: Vec<u64>,
    pub bit_locations: Vec<BitLocation>,
}

impl TagFamily {
    /// Construct a family from a parsed config and a slice of codes.
    pub fn from_config_and_codes(
        config: FamilyConfig,
        codes: Vec<u64>,
    ) -> Result<TagFamily, LayoutError> {
        let layout = build_layout(&config.layout)?;
        let bit_locations = bits::bit_locations(&layout);
        Ok(TagFamily {
            config,
            layout,
            codes,
            bit_locations,
        })
    }

    /// Parse a TOML config string and binary code data into a TagFamily.
    ///
    /// Used for custom, user-supplied families; none of this crate's
    /// built-in families load this way (see the synthetic codebook
    /// generator below).
    #[cfg(feature = "serde")]
    pub fn from_toml_and_bin(toml_str: &str, bin_data: &[u8]) -> Result<TagFamily, FamilyError> {
        let config: FamilyConfig =
            toml::from_str(toml_str).map_err(|e| FamilyError::Config(e.to_string()))?;
        let codes = parse_bin_codes(bin_data)?;
        TagFamily::from_config_and_codes(config, codes).map_err(FamilyError::Layout)
    }
}

/// Build a Layout from a LayoutConfig.
fn build_layout(config: &LayoutConfig) -> Result<Layout, LayoutError> {
    match config {
        LayoutConfig::Classic { grid_size } => Layout::classic(*grid_size),
        LayoutConfig::Standard { grid_size } => Layout::standard(*grid_size),
        LayoutConfig::Circle { grid_size } => Layout::circle(*grid_size),
        LayoutConfig::Custom { data, .. } => Layout::from_data_string(data),
    }
}

/// Parse a binary code file (flat array of little-endian u64).
fn parse_bin_codes(data: &[u8]) -> Result<Vec<u64>, FamilyError> {
    if !data.len().is_multiple_of(8) {
        return Err(FamilyError::InvalidBin(format!(
            "binary data length {} is not a multiple of 8",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FamilyError {
    #[error("config error: {0}")]
    Config(String),
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("invalid binary data: {0}")]
    InvalidBin(String),
}

// --- Synthetic codebook generation for built-in families ---
//
// The real AprilTag codebooks (tens of thousands of pre-computed codewords
// per family, selected offline for maximal minimum-Hamming-distance) are
// external data this crate does not ship. Built-in families are instead
// generated deterministically at construction time: a seeded linear
// congruential generator proposes candidate codewords, and each candidate
// is accepted only if its Hamming distance to every already-accepted code
// is at least `2*h + 1` (the family's error-correction invariant). This
// is slower and yields far fewer codes than an offline search would, but
// satisfies the same invariant real codebooks are built to satisfy.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_add(0x9E3779B97F4A7C15))
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }
}

fn min_hamming_distance(code: u64, existing: &[u64]) -> u32 {
    existing
        .iter()
        .map(|&c| (code ^ c).count_ones())
        .min()
        .unwrap_or(u32::MAX)
}

/// Generate a deterministic synthetic codebook of up to `target_count` codes,
/// each of `nbits` bits, with pairwise Hamming distance at least `2*h + 1`.
///
/// Stops early (with fewer than `target_count` codes) once candidate
/// generation stops finding acceptable codes within a bounded attempt budget
/// — this always terminates and never produces codes violating the distance
/// invariant.
fn generate_codebook(nbits: u32, h: u32, seed: u64, target_count: usize) -> Vec<u64> {
    let min_dist = 2 * h + 1;
    let mask = if nbits >= 64 {
        u64::MAX
    } else {
        (1u64 << nbits) - 1
    };
    let mut rng = Lcg::new(seed);
    let mut codes = Vec::with_capacity(target_count);
    let max_attempts = target_count.saturating_mul(4000).max(100_000);
    let mut attempts = 0;
    while codes.len() < target_count && attempts < max_attempts {
        attempts += 1;
        let candidate = rng.next_u64() & mask;
        if min_dist == 0 || min_hamming_distance(candidate, &codes) >= min_dist {
            codes.push(candidate);
        }
    }
    codes
}

fn layout_config_classic(grid_size: usize) -> LayoutConfig {
    LayoutConfig::Classic { grid_size }
}

fn synthetic_family(
    name: &str,
    min_hamming: u32,
    layout_config: LayoutConfig,
    seed: u64,
    target_count: usize,
) -> TagFamily {
    let layout = build_layout(&layout_config).expect("built-in layout shape is always valid");
    let codes = generate_codebook(layout.nbits as u32, min_hamming, seed, target_count);
    let config = FamilyConfig {
        name: name.to_string(),
        min_hamming,
        min_complexity: None,
        layout: layout_config,
    };
    TagFamily::from_config_and_codes(config, codes)
        .expect("built-in family construction is always valid")
}

/// `tag16h5`: 8x8 classic layout, 16 data bits, Hamming radius 5.
pub fn tag16h5() -> TagFamily {
    synthetic_family("tag16h5", 5, layout_config_classic(8), 0x7461_6731_3668_35, 30)
}

/// `tag25h9`: 9x9 classic layout, 25 data bits, Hamming radius 9.
pub fn tag25h9() -> TagFamily {
    synthetic_family("tag25h9", 9, layout_config_classic(9), 0x7461_6732_3568_39, 35)
}

/// `tag25h7`: 9x9 classic layout, 25 data bits, Hamming radius 7.
pub fn tag25h7() -> TagFamily {
    synthetic_family("tag25h7", 7, layout_config_classic(9), 0x7461_6732_3568_37, 35)
}

/// `tag36h11`: 10x10 classic layout, 36 data bits, Hamming radius 11.
pub fn tag36h11() -> TagFamily {
    synthetic_family("tag36h11", 11, layout_config_classic(10), 0x7461_6733_3668_3131, 40)
}

/// `tag36h10`: 10x10 classic layout, 36 data bits, Hamming radius 10.
pub fn tag36h10() -> TagFamily {
    synthetic_family("tag36h10", 10, layout_config_classic(10), 0x7461_6733_3668_3130, 40)
}

/// `tag36artoolkit`: 10x10 classic layout, 36 data bits. ARToolKit-style
/// tags historically carry no guaranteed minimum Hamming distance between
/// codes (`h = 0`); codes are only required to be pairwise distinct.
pub fn tag36artoolkit() -> TagFamily {
    synthetic_family(
        "tag36artoolkit",
        0,
        layout_config_classic(10),
        0x7461_6733_3661_7274,
        40,
    )
}

/// List of all built-in family names.
pub const BUILTIN_NAMES: &[&str] = &[
    "tag36h11",
    "tag36h10",
    "tag36artoolkit",
    "tag25h9",
    "tag25h7",
    "tag16h5",
];

/// Load a built-in family by name.
pub fn builtin_family(name: &str) -> Option<TagFamily> {
    match name {
        "tag16h5" => Some(tag16h5()),
        "tag25h9" => Some(tag25h9()),
        "tag25h7" => Some(tag25h7()),
        "tag36h11" => Some(tag36h11()),
        "tag36h10" => Some(tag36h10()),
        "tag36artoolkit" => Some(tag36artoolkit()),
        _ => None,
    }
}
