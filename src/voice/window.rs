use std::sync::LazyLock;

// -------------------------------------------------------------------------------------------------

/// Amplitude envelope which gets applied to each grain.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
pub enum GrainWindowMode {
    /// Raised cosine over the whole grain.
    #[default]
    Hann,
    /// Linear rise to the center and linear fall.
    Triangle,
    /// Cosine fades over the outer quarters with a flat center.
    Tukey,
    /// Short linear fades with a flat center.
    Trapezoid,
}

const TUKEY_FADE: f64 = 0.25;
const TRAPEZOID_FADE: f64 = 0.1;

impl GrainWindowMode {
    /// Envelope gain at the given grain phase. Phases are clamped to `[0, 1]`.
    #[inline]
    pub fn gain(self, phase: f64) -> f32 {
        let phase = phase.clamp(0.0, 1.0);
        // distance to the closer grain edge, 0.5 at the center
        let edge = phase.min(1.0 - phase);
        match self {
            Self::Hann => HANN_TABLE.lookup(phase),
            Self::Triangle => (2.0 * edge) as f32,
            Self::Tukey => {
                if edge < TUKEY_FADE {
                    // rising half of the hann window
                    HANN_TABLE.lookup(edge / (2.0 * TUKEY_FADE))
                } else {
                    1.0
                }
            }
            Self::Trapezoid => (edge / TRAPEZOID_FADE).min(1.0) as f32,
        }
    }
}

// -------------------------------------------------------------------------------------------------

const HANN_TABLE_SIZE: usize = 512;

/// Symmetric Hann window which starts and ends with zero.
struct HannTable([f32; HANN_TABLE_SIZE]);

static HANN_TABLE: LazyLock<HannTable> = LazyLock::new(HannTable::new);

impl HannTable {
    fn new() -> Self {
        let last = (HANN_TABLE_SIZE - 1) as f32;
        Self(std::array::from_fn(|index| {
            0.5 - 0.5 * (std::f32::consts::TAU * index as f32 / last).cos()
        }))
    }

    /// Linearly interpolated value at a phase in `[0, 1]`.
    #[inline]
    fn lookup(&self, phase: f64) -> f32 {
        let position = phase * (HANN_TABLE_SIZE - 1) as f64;
        let index = position as usize;
        if index + 1 >= HANN_TABLE_SIZE {
            return self.0[HANN_TABLE_SIZE - 1];
        }
        let fraction = (position - index as f64) as f32;
        self.0[index] + (self.0[index + 1] - self.0[index]) * fraction
    }
}

// -------------------------------------------------------------------------------------------------
