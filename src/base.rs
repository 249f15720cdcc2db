//! Nucleotide symbols and the scaled-integer position representation used
//! throughout the aggregator to avoid floating-point grouping ambiguity.
use std::fmt;

use crate::error::PipelineError;

/// One of the five symbols a base-call record or consensus position can take.
///
/// Ordering here is significant: it fixes the seeding order in the frequency
/// table and acts as the deterministic tie-break when more than one base
/// shares `base_rank = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Base {
    A,
    G,
    T,
    C,
    Gap,
}

/// Seeding order for the frequency table: every integer position gets one
/// row per entry here, even if no read ever calls that base.
pub const ALL_BASES: [Base; 5] = [Base::A, Base::G, Base::T, Base::C, Base::Gap];

impl Base {
    /// Parses a read-call base, accepting the deletion symbol `-`.
    pub fn parse_call(symbol: &str) -> Result<Self, PipelineError> {
        match symbol {
            "A" => Ok(Base::A),
            "G" => Ok(Base::G),
            "T" => Ok(Base::T),
            "C" => Ok(Base::C),
            "-" => Ok(Base::Gap),
            other => Err(PipelineError::UnknownBase {
                symbol: other.to_string(),
                context: "read_base",
            }),
        }
    }

    /// Parses a reference base; `-` is not a valid reference symbol.
    pub fn parse_reference(symbol: &str) -> Result<Self, PipelineError> {
        match symbol {
            "A" => Ok(Base::A),
            "G" => Ok(Base::G),
            "T" => Ok(Base::T),
            "C" => Ok(Base::C),
            other => Err(PipelineError::UnknownBase {
                symbol: other.to_string(),
                context: "ref_base",
            }),
        }
    }

    /// Maps a reference nucleotide byte (as read from a FASTA record) to a
    /// `Base`. `N` is reported as an error here since callers that need this
    /// (the AFR seeder) only ever invoke it on resolved reference symbols;
    /// `N` stretches are handled upstream by the reference loader.
    pub fn from_reference_byte(byte: u8) -> Result<Self, PipelineError> {
        Self::parse_reference(std::str::from_utf8(&[byte]).unwrap_or("?"))
    }

    pub fn as_char(&self) -> char {
        match self {
            Base::A => 'A',
            Base::G => 'G',
            Base::T => 'T',
            Base::C => 'C',
            Base::Gap => '-',
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// `ref_pos` scaled by 1000 and rounded, stored as an integer so that
/// grouping by position never suffers from floating-point comparison drift.
pub type ScaledPos = i64;

const SCALE: f64 = 1000.0;

/// Rounds `pos` to 3 decimal places and scales it into an integer key.
pub fn scale_pos(pos: f64) -> ScaledPos {
    (pos * SCALE).round() as ScaledPos
}

/// Inverse of [`scale_pos`]; returns the position rounded to 3 decimals.
pub fn unscale_pos(scaled: ScaledPos) -> f64 {
    scaled as f64 / SCALE
}

/// The reference coordinate (integer part) a scaled position belongs to.
pub fn integer_part(scaled: ScaledPos) -> i64 {
    scaled.div_euclid(1000)
}

/// Whether `scaled` encodes an insertion offset (nonzero fractional part).
pub fn is_insertion(scaled: ScaledPos) -> bool {
    scaled.rem_euclid(1000) != 0
}
