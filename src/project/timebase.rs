use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// Positive rational frame rate (`num / den` frames per second)
///
/// Serialized as a plain number so project files can say `frame_rate = 30` or
/// `frame_rate = 29.97`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FrameRate {
    num: u32,
    den: u32,
}

/// NTSC rates that should be recovered exactly from their decimal spelling
const NTSC_BASES: [u32; 4] = [24, 30, 48, 60];

/// How close a decimal rate must be to an NTSC rate to snap onto it
const NTSC_TOLERANCE: f64 = 1e-3;

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(ExportError::invalid_project(format!(
                "frame rate must be positive, got {}/{}",
                num, den
            )));
        }
        let g = gcd(num, den);
        Ok(Self { num: num / g, den: den / g })
    }

    /// Build a frame rate from a decimal fps value
    pub fn from_fps(fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ExportError::invalid_project(format!(
                "frame rate must be a positive number, got {}",
                fps
            )));
        }

        let whole = fps.round();
        if whole >= 1.0 && whole <= u32::MAX as f64 && (fps - whole).abs() < 1e-9 {
            return Self::new(whole as u32, 1);
        }

        for base in NTSC_BASES {
            let ntsc = base as f64 * 1000.0 / 1001.0;
            if (fps - ntsc).abs() < NTSC_TOLERANCE {
                return Self::new(base * 1000, 1001);
            }
        }

        Self::from_decimal(fps)
    }

    /// Smallest power-of-ten denominator that represents `fps`, down to a 1e-6 grid
    fn from_decimal(fps: f64) -> Result<Self> {
        let fits = |num: f64| num >= 1.0 && num <= u32::MAX as f64;

        for exponent in 1..=6 {
            let den = 10u32.pow(exponent);
            let num = (fps * den as f64).round();
            if fits(num) && (num / den as f64 - fps).abs() <= fps * 1e-9 {
                return Self::new(num as u32, den);
            }
        }

        let num = (fps * 1e6).round();
        if fits(num) {
            return Self::new(num as u32, 1_000_000);
        }
        // Slower than one frame per million seconds: one frame every n seconds
        let period = (1.0 / fps).round();
        if fits(period) {
            return Self::new(1, period as u32);
        }
        Err(ExportError::invalid_project(format!(
            "frame rate {} cannot be represented",
            fps
        )))
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Duration of a single frame in seconds
    pub fn frame_duration(&self) -> f64 {
        self.den as f64 / self.num as f64
    }

    /// Presentation timestamp of a frame index in seconds
    pub fn timestamp(&self, index: u64) -> f64 {
        index as f64 * self.den as f64 / self.num as f64
    }

    /// Number of frames needed to cover `duration` seconds (`ceil(duration * fps)`)
    pub fn total_frames(&self, duration: f64) -> u64 {
        if !duration.is_finite() || duration <= 0.0 {
            return 0;
        }
        let exact = duration * self.num as f64 / self.den as f64;
        // Absorb float noise like 0.1 * 30 = 3.0000000000000004
        let nearest = exact.round();
        let frames = if nearest >= 1.0 && (exact - nearest).abs() <= nearest * 1e-9 {
            nearest
        } else {
            exact.ceil()
        };
        // Any positive duration needs at least one frame
        (frames as u64).max(1)
    }

    /// Output audio sample index at which frame `index` starts
    pub fn frame_to_sample(&self, index: u64, sample_rate: u32) -> u64 {
        let num = u128::from(index) * u128::from(sample_rate) * u128::from(self.den);
        let den = u128::from(self.num);
        ((num + den / 2) / den) as u64
    }

    /// Contiguous audio sample range covering frame `index`
    pub fn sample_range(&self, index: u64, sample_rate: u32) -> SampleRange {
        SampleRange {
            start: self.frame_to_sample(index, sample_rate),
            end: self.frame_to_sample(index + 1, sample_rate),
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

impl TryFrom<f64> for FrameRate {
    type Error = String;

    fn try_from(fps: f64) -> std::result::Result<Self, Self::Error> {
        Self::from_fps(fps).map_err(|e| e.to_string())
    }
}

impl From<FrameRate> for f64 {
    fn from(rate: FrameRate) -> f64 {
        rate.as_f64()
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Half-open range of output audio sample frames `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    pub start: u64,
    pub end: u64,
}

impl SampleRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start_seconds(&self, sample_rate: u32) -> f64 {
        self.start as f64 / sample_rate as f64
    }

    pub fn end_seconds(&self, sample_rate: u32) -> f64 {
        self.end as f64 / sample_rate as f64
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
