/// Fixed configuration of the cascaded shadow system.
///
/// The system is rebuilt wholesale (dispose + construct) whenever setup
/// runs; reconfiguring an existing system in place is not supported.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    pub cascades: usize,
    pub shadow_map_size: u32,
    pub shadow_bias: f32,
    pub light_direction: [f32; 3],
    pub light_intensity: f32,
    pub fade: bool,
    /// Far plane the cascades cover: the camera far plane capped at
    /// `MAX_FAR`.
    pub far: f32,
}

impl ShadowSettings {
    pub const CASCADES: usize = 3;
    pub const MAP_SIZE: u32 = 2048;
    pub const BIAS: f32 = 0.00025;
    pub const LIGHT_DIRECTION: [f32; 3] = [-2.0, -2.0, -0.5];
    pub const LIGHT_INTENSITY: f32 = 0.6;
    pub const MAX_FAR: f32 = 1000.0;

    /// Standard settings for a camera with the given far plane.
    pub fn for_camera(camera_far: f32) -> Self {
        Self {
            cascades: Self::CASCADES,
            shadow_map_size: Self::MAP_SIZE,
            shadow_bias: Self::BIAS,
            light_direction: Self::LIGHT_DIRECTION,
            light_intensity: Self::LIGHT_INTENSITY,
            fade: true,
            far: camera_far.min(Self::MAX_FAR),
        }
    }
}

/// Practical cascade split scheme: a 50/50 blend of the logarithmic and
/// uniform split distances over `near..far`. Returns the far edge of each
/// cascade, ending exactly at `far`.
pub fn practical_splits(near: f32, far: f32, cascades: usize) -> Vec<f32> {
    const LAMBDA: f32 = 0.5;
    let mut splits = Vec::with_capacity(cascades);
    for i in 1..=cascades {
        let fraction = i as f32 / cascades as f32;
        let uniform = near + (far - near) * fraction;
        let logarithmic = near * (far / near).powf(fraction);
        splits.push(logarithmic * LAMBDA + uniform * (1.0 - LAMBDA));
    }
    if let Some(last) = splits.last_mut() {
        *last = far;
    }
    splits
}
