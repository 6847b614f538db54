use std::collections::HashMap;

use lightconfig::DataType;

use crate::scene::{LightId, SceneBackend, SceneError, ShadowId, TextureId};
use crate::shadow::{practical_splits, ShadowSettings};

/// What a headless texture resource holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Decoded straight from payload bytes.
    Decoded(DataType),
    /// Pre-filtered environment map derived from a decoded texture.
    Environment,
}

struct TextureRecord {
    kind: TextureKind,
    width: u32,
    height: u32,
}

struct LightRecord {
    color: u32,
    intensity: f32,
}

struct ShadowRecord {
    settings: ShadowSettings,
    splits: Vec<f32>,
    refreshes: u64,
}

const EXR_MAGIC: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];
const HDR_MAGIC: &[u8] = b"#?";

/// Reference [`SceneBackend`] with full resource accounting.
///
/// Every create/dispose is tracked, so tests can assert that a lifecycle
/// leaves no leaked lights or textures behind. Png/Jpeg payloads are decoded
/// for real via the `image` crate; Exr/Hdr radiance payloads are validated
/// by magic number and carried opaquely (dimensions unknown).
pub struct HeadlessScene {
    camera_near: f32,
    camera_far: f32,
    next_id: u64,
    lights: HashMap<LightId, LightRecord>,
    shadows: HashMap<ShadowId, ShadowRecord>,
    textures: HashMap<TextureId, TextureRecord>,
    background: Option<TextureId>,
    environment: Option<TextureId>,
    disposed_textures: u64,
}

impl HeadlessScene {
    pub fn new(camera_near: f32, camera_far: f32) -> Self {
        Self {
            camera_near,
            camera_far,
            next_id: 0,
            lights: HashMap::new(),
            shadows: HashMap::new(),
            textures: HashMap::new(),
            background: None,
            environment: None,
            disposed_textures: 0,
        }
    }

    /// Moves the camera planes; the next shadow refresh picks them up.
    pub fn set_camera(&mut self, near: f32, far: f32) {
        self.camera_near = near;
        self.camera_far = far;
    }

    pub fn alive_lights(&self) -> usize {
        self.lights.len()
    }

    pub fn alive_shadows(&self) -> usize {
        self.shadows.len()
    }

    pub fn alive_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn disposed_textures(&self) -> u64 {
        self.disposed_textures
    }

    pub fn light_color(&self, light: LightId) -> Option<u32> {
        self.lights.get(&light).map(|record| record.color)
    }

    pub fn light_intensity(&self, light: LightId) -> Option<f32> {
        self.lights.get(&light).map(|record| record.intensity)
    }

    pub fn cascade_splits(&self, shadow: ShadowId) -> Option<&[f32]> {
        self.shadows.get(&shadow).map(|record| record.splits.as_slice())
    }

    pub fn shadow_refreshes(&self, shadow: ShadowId) -> Option<u64> {
        self.shadows.get(&shadow).map(|record| record.refreshes)
    }

    pub fn texture_kind(&self, texture: TextureId) -> Option<TextureKind> {
        self.textures.get(&texture).map(|record| record.kind)
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures
            .get(&texture)
            .map(|record| (record.width, record.height))
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Default for HeadlessScene {
    fn default() -> Self {
        Self::new(0.1, 1000.0)
    }
}

impl SceneBackend for HeadlessScene {
    fn add_ambient_light(&mut self, color: u32, intensity: f32) -> LightId {
        let id = LightId(self.next());
        self.lights.insert(id, LightRecord { color, intensity });
        id
    }

    fn set_light_color(&mut self, light: LightId, color: u32) -> Result<(), SceneError> {
        let record = self
            .lights
            .get_mut(&light)
            .ok_or(SceneError::UnknownLight(light))?;
        record.color = color;
        Ok(())
    }

    fn remove_light(&mut self, light: LightId) -> Result<(), SceneError> {
        self.lights
            .remove(&light)
            .map(|_| ())
            .ok_or(SceneError::UnknownLight(light))
    }

    fn create_shadow_system(&mut self, settings: &ShadowSettings) -> ShadowId {
        let id = ShadowId(self.next());
        let splits = practical_splits(self.camera_near, settings.far, settings.cascades);
        self.shadows.insert(
            id,
            ShadowRecord {
                settings: settings.clone(),
                splits,
                refreshes: 0,
            },
        );
        id
    }

    fn refresh_shadow_system(&mut self, shadow: ShadowId) -> Result<(), SceneError> {
        let far = self.camera_far.min(ShadowSettings::MAX_FAR);
        let near = self.camera_near;
        let record = self
            .shadows
            .get_mut(&shadow)
            .ok_or(SceneError::UnknownShadow(shadow))?;
        record.splits = practical_splits(near, far, record.settings.cascades);
        record.refreshes += 1;
        Ok(())
    }

    fn dispose_shadow_system(&mut self, shadow: ShadowId) -> Result<(), SceneError> {
        self.shadows
            .remove(&shadow)
            .map(|_| ())
            .ok_or(SceneError::UnknownShadow(shadow))
    }

    fn decode_texture(
        &mut self,
        bytes: &[u8],
        data_type: DataType,
    ) -> Result<TextureId, SceneError> {
        let (width, height) = match data_type {
            DataType::Png | DataType::Jpeg => {
                let format = match data_type {
                    DataType::Png => image::ImageFormat::Png,
                    _ => image::ImageFormat::Jpeg,
                };
                let decoded = image::load_from_memory_with_format(bytes, format).map_err(
                    |err| SceneError::Decode {
                        data_type,
                        reason: err.to_string(),
                    },
                )?;
                (decoded.width(), decoded.height())
            }
            DataType::Exr => {
                if !bytes.starts_with(&EXR_MAGIC) {
                    return Err(SceneError::Decode {
                        data_type,
                        reason: "missing OpenEXR magic number".into(),
                    });
                }
                (0, 0)
            }
            DataType::Hdr => {
                if !bytes.starts_with(HDR_MAGIC) {
                    return Err(SceneError::Decode {
                        data_type,
                        reason: "missing radiance header".into(),
                    });
                }
                (0, 0)
            }
        };

        let id = TextureId(self.next());
        self.textures.insert(
            id,
            TextureRecord {
                kind: TextureKind::Decoded(data_type),
                width,
                height,
            },
        );
        Ok(id)
    }

    fn prefilter_environment(&mut self, source: TextureId) -> Result<TextureId, SceneError> {
        let (width, height) = self
            .texture_size(source)
            .ok_or(SceneError::UnknownTexture(source))?;
        let id = TextureId(self.next());
        self.textures.insert(
            id,
            TextureRecord {
                kind: TextureKind::Environment,
                width,
                height,
            },
        );
        Ok(id)
    }

    fn dispose_texture(&mut self, texture: TextureId) -> Result<(), SceneError> {
        self.textures
            .remove(&texture)
            .ok_or(SceneError::UnknownTexture(texture))?;
        self.disposed_textures += 1;
        Ok(())
    }

    fn background(&self) -> Option<TextureId> {
        self.background
    }

    fn environment(&self) -> Option<TextureId> {
        self.environment
    }

    fn set_background(&mut self, texture: Option<TextureId>) {
        self.background = texture;
    }

    fn set_environment(&mut self, texture: Option<TextureId>) {
        self.environment = texture;
    }

    fn camera_far(&self) -> f32 {
        self.camera_far
    }
}

/// Minimal valid 2x2 PNG produced through the same decoder we read with.
#[cfg(test)]
pub(crate) fn png_fixture() -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    let pixels = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255]));
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}
