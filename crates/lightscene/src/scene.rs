use lightconfig::DataType;

use crate::shadow::ShadowSettings;

/// Handle to a light owned by the scene backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(pub u64);

/// Handle to a cascaded shadow system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowId(pub u64);

/// Handle to a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("unknown light {0:?}")]
    UnknownLight(LightId),
    #[error("unknown shadow system {0:?}")]
    UnknownShadow(ShadowId),
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("failed to decode {data_type} texture: {reason}")]
    Decode { data_type: DataType, reason: String },
}

impl SceneError {
    /// Decode failures are recoverable (the previous background stays
    /// installed); everything else indicates a handle-ownership bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SceneError::Decode { .. })
    }
}

/// Everything the resource manager needs from the host renderer.
///
/// Handles are opaque: the manager tracks which ones it created and the
/// backend owns the actual GPU-side resources behind them. All handles are
/// explicitly injected rather than looked up through a global render
/// service.
pub trait SceneBackend {
    fn add_ambient_light(&mut self, color: u32, intensity: f32) -> LightId;
    fn set_light_color(&mut self, light: LightId, color: u32) -> Result<(), SceneError>;
    /// Detaches the light from the scene and disposes its resource.
    fn remove_light(&mut self, light: LightId) -> Result<(), SceneError>;

    fn create_shadow_system(&mut self, settings: &ShadowSettings) -> ShadowId;
    /// Recomputes the cascade splits against the current camera; called once
    /// per frame while a shadow system exists.
    fn refresh_shadow_system(&mut self, shadow: ShadowId) -> Result<(), SceneError>;
    fn dispose_shadow_system(&mut self, shadow: ShadowId) -> Result<(), SceneError>;

    /// Decodes raw payload bytes into a texture resource.
    fn decode_texture(&mut self, bytes: &[u8], data_type: DataType)
        -> Result<TextureId, SceneError>;
    /// Derives a pre-filtered environment map from a decoded texture (the
    /// one-time shader compilation step in a GPU backend).
    fn prefilter_environment(&mut self, source: TextureId) -> Result<TextureId, SceneError>;
    fn dispose_texture(&mut self, texture: TextureId) -> Result<(), SceneError>;

    fn background(&self) -> Option<TextureId>;
    fn environment(&self) -> Option<TextureId>;
    fn set_background(&mut self, texture: Option<TextureId>);
    fn set_environment(&mut self, texture: Option<TextureId>);

    fn camera_far(&self) -> f32;
}
