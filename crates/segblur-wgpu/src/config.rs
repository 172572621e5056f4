//! Pipeline configuration and execution variants
//!
//! A [`PipelineConfig`] is fixed for the lifetime of a pipeline. Its boolean
//! axes are resolved once into a [`PipelineVariant`] so the per-frame code
//! matches on enums instead of re-testing flag combinations.

use crate::error::ConfigError;

/// Processing resolution used when a frame does not report its display size,
/// and the initial size of the presentation surface
pub const PROCESSING_FLOOR: (u32, u32) = (1280, 720);

/// Kernel parameter handed to the blur engine on every frame
pub const BLUR_KERNEL_SIZE: u32 = 360;

/// Default segmentation resolution (landscape selfie-segmentation input)
pub const DEFAULT_SEGMENTATION_SIZE: (u32, u32) = (256, 144);

/// Immutable per-session pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct PipelineConfig {
    /// Sample the caller's frame texture directly instead of copying it into a pipeline-owned texture
    pub zero_copy: bool,
    /// Let the blur engine write straight into the surface texture, skipping the compositor
    pub direct_output: bool,
    /// Width of the image fed to the segmenter
    pub segmentation_width: u32,
    /// Height of the image fed to the segmenter
    pub segmentation_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            zero_copy: false,
            direct_output: false,
            segmentation_width: DEFAULT_SEGMENTATION_SIZE.0,
            segmentation_height: DEFAULT_SEGMENTATION_SIZE.1,
        }
    }
}

impl PipelineConfig {
    pub fn with_zero_copy(mut self, zero_copy: bool) -> Self {
        self.zero_copy = zero_copy;
        self
    }

    pub fn with_direct_output(mut self, direct_output: bool) -> Self {
        self.direct_output = direct_output;
        self
    }

    pub fn with_segmentation_size(mut self, width: u32, height: u32) -> Self {
        self.segmentation_width = width;
        self.segmentation_height = height;
        self
    }

    /// Returns the segmentation resolution as (width, height)
    pub fn segmentation_size(&self) -> (u32, u32) {
        (self.segmentation_width, self.segmentation_height)
    }

    /// Checks the configuration against the device limits
    ///
    /// # Arguments
    /// * `max_texture_dimension` - The device's `max_texture_dimension_2d` limit
    pub fn validate(&self, max_texture_dimension: u32) -> Result<(), ConfigError> {
        let (width, height) = self.segmentation_size();
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptySegmentationSize { width, height });
        }
        if width > max_texture_dimension || height > max_texture_dimension {
            return Err(ConfigError::SegmentationSizeTooLarge {
                width,
                height,
                limit: max_texture_dimension,
            });
        }
        Ok(())
    }

    /// Resolves the boolean axes into the execution variant
    pub fn variant(&self) -> PipelineVariant {
        PipelineVariant {
            source: if self.zero_copy { SourceBinding::Imported } else { SourceBinding::Copied },
            output: if self.direct_output { OutputRoute::Direct } else { OutputRoute::Composited },
        }
    }
}

/// How the incoming frame is made available to the GPU passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceBinding {
    /// The caller's texture is bound directly as a single-use view
    Imported,
    /// The caller's texture is copied into a persistent pipeline-owned texture
    Copied,
}

impl SourceBinding {
    pub fn name(&self) -> &'static str {
        match self {
            SourceBinding::Imported => "imported",
            SourceBinding::Copied => "copied",
        }
    }
}

/// Where the blur engine writes its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRoute {
    /// Straight into the presentation surface texture
    Direct,
    /// Into an intermediate texture resolved onto the surface by the compositor
    Composited,
}

impl OutputRoute {
    pub fn name(&self) -> &'static str {
        match self {
            OutputRoute::Direct => "direct",
            OutputRoute::Composited => "composited",
        }
    }
}

/// The execution variant of a pipeline, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineVariant {
    pub source: SourceBinding,
    pub output: OutputRoute,
}
