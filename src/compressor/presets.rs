use crate::errors::{AppError, AppResult};

/// One compression attempt's quality and bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    /// Lossy quality in (0, 1].
    pub quality: f32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Preset {
    pub const fn new(quality: f32, max_width: u32, max_height: u32) -> Self {
        Self {
            quality,
            max_width,
            max_height,
        }
    }

    pub const fn square(quality: f32, max_side: u32) -> Self {
        Self::new(quality, max_side, max_side)
    }

    /// Fit `width` x `height` inside the bounding box, keeping the aspect ratio.
    /// Never upscales and never returns a zero side.
    pub fn scaled_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width.max(1), height.max(1));
        }

        let ratio = (self.max_width as f64 / width as f64)
            .min(self.max_height as f64 / height as f64)
            .min(1.0);

        if ratio >= 1.0 {
            return (width, height);
        }

        let scaled_width = ((width as f64 * ratio).round() as u32).clamp(1, self.max_width);
        let scaled_height = ((height as f64 * ratio).round() as u32).clamp(1, self.max_height);
        (scaled_width, scaled_height)
    }

    fn validate(&self, field: &str) -> AppResult<()> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(AppError::validation(field, "Quality must be in (0, 1]"));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(AppError::validation(field, "Bounding box must be non-empty"));
        }
        Ok(())
    }
}

/// Ordered presets tried in turn, then the fallback of last resort.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetLadder {
    steps: Vec<Preset>,
    fallback: Preset,
}

impl Default for PresetLadder {
    fn default() -> Self {
        Self {
            steps: vec![
                Preset::square(0.60, 1200),
                Preset::square(0.52, 1200),
                Preset::square(0.46, 1024),
                Preset::square(0.42, 960),
            ],
            fallback: Preset::square(0.40, 900),
        }
    }
}

impl PresetLadder {
    /// Quality and both bounds must be non-increasing from step to step,
    /// fallback included.
    pub fn new(steps: Vec<Preset>, fallback: Preset) -> AppResult<Self> {
        for (i, preset) in steps.iter().enumerate() {
            preset.validate(&format!("presets[{}]", i))?;
        }
        fallback.validate("fallback")?;

        let chain: Vec<&Preset> = steps.iter().chain(std::iter::once(&fallback)).collect();
        for pair in chain.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.quality > prev.quality
                || next.max_width > prev.max_width
                || next.max_height > prev.max_height
            {
                return Err(AppError::validation(
                    "presets",
                    "Presets must not increase in quality or dimensions",
                ));
            }
        }

        Ok(Self { steps, fallback })
    }

    pub fn steps(&self) -> &[Preset] {
        &self.steps
    }

    pub fn fallback(&self) -> Preset {
        self.fallback
    }

    /// Total number of attempts a single image may take.
    pub fn max_attempts(&self) -> usize {
        self.steps.len() + 1
    }
}
