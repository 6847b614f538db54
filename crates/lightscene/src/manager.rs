use cardassets::{AssetClient, AssetError, BackgroundLoader, DataLocation, LoadRequest};
use lightbus::{Bus, CardId, Event, Scope};
use lightconfig::{CardConfig, DataType};

use crate::scene::{LightId, SceneBackend, SceneError, ShadowId};
use crate::shadow::ShadowSettings;

/// Intensity of the ambient light seeded from the authoritative color.
pub const AMBIENT_INTENSITY: f32 = 0.5;

/// Ambient color used until the first authoritative color arrives.
const FALLBACK_COLOR: u32 = 0xffffff;

/// Owns the rendering replica's visible resources: the ambient light, the
/// cascaded shadow system, and the background/environment texture.
///
/// Resources belong exclusively to this replica and are rebuilt wholesale
/// on every [`setup`](Self::setup). Background loads are tagged with a
/// configuration generation; completions from a superseded configuration
/// (or from before a teardown) are discarded instead of installed.
pub struct LightResourceManager {
    card: CardId,
    bus: Bus,
    client: AssetClient,
    loader: BackgroundLoader,
    lights: Vec<LightId>,
    shadow: Option<ShadowId>,
    generation: u64,
    installed: u64,
    discarded: u64,
    failed: u64,
}

impl LightResourceManager {
    pub fn new(card: CardId, bus: Bus) -> Result<Self, AssetError> {
        Ok(Self {
            card,
            bus,
            client: AssetClient::new()?,
            loader: BackgroundLoader::spawn()?,
            lights: Vec::new(),
            shadow: None,
            generation: 0,
            installed: 0,
            discarded: 0,
            failed: 0,
        })
    }

    pub fn ambient_light(&self) -> Option<LightId> {
        self.lights.first().copied()
    }

    pub fn shadow_system(&self) -> Option<ShadowId> {
        self.shadow
    }

    /// Backgrounds installed since construction.
    pub fn loads_installed(&self) -> u64 {
        self.installed
    }

    /// Stale completions discarded by the generation guard.
    pub fn loads_discarded(&self) -> u64 {
        self.discarded
    }

    /// Fetches or decodes that failed (previous environment kept).
    pub fn loads_failed(&self) -> u64 {
        self.failed
    }

    /// Builds the replica's resources, tearing down any prior ones first so
    /// a repeated setup (resize, reload) never duplicates lights.
    pub fn setup(
        &mut self,
        scene: &mut dyn SceneBackend,
        card: &CardConfig,
        seed_color: Option<u32>,
    ) -> Result<(), SceneError> {
        self.remove_lights(scene)?;

        let settings = ShadowSettings::for_camera(scene.camera_far());
        self.shadow = Some(scene.create_shadow_system(&settings));

        let color = seed_color.unwrap_or(FALLBACK_COLOR);
        let ambient = scene.add_ambient_light(color, AMBIENT_INTENSITY);
        self.lights.push(ambient);
        tracing::info!(
            card = %self.card,
            color = format_args!("{color:#08x}"),
            shadow_far = settings.far,
            "light resources built"
        );

        self.construct_background(scene, card)
    }

    /// Applies an authoritative color update. No-op while resources are
    /// absent: the event may arrive before setup completes or after
    /// teardown.
    pub fn change_light(
        &mut self,
        scene: &mut dyn SceneBackend,
        color: u32,
    ) -> Result<(), SceneError> {
        let Some(&ambient) = self.lights.first() else {
            return Ok(());
        };
        scene.set_light_color(ambient, color)
    }

    /// Disposes and detaches every tracked light and the shadow system.
    /// Safe to call when nothing is allocated.
    pub fn remove_lights(&mut self, scene: &mut dyn SceneBackend) -> Result<(), SceneError> {
        for light in self.lights.drain(..) {
            scene.remove_light(light)?;
        }
        if let Some(shadow) = self.shadow.take() {
            scene.dispose_shadow_system(shadow)?;
        }
        Ok(())
    }

    /// Tears everything down, leaving the scene indistinguishable from one
    /// that was never configured.
    pub fn teardown(&mut self, scene: &mut dyn SceneBackend) -> Result<(), SceneError> {
        self.remove_lights(scene)?;

        // Invalidate any in-flight load so a late completion cannot
        // resurrect a background on a torn-down scene.
        self.generation += 1;

        let background = scene.background();
        let environment = scene.environment();
        scene.set_background(None);
        scene.set_environment(None);
        if let Some(texture) = background {
            if environment != Some(texture) {
                scene.dispose_texture(texture)?;
            }
        }
        if let Some(texture) = environment {
            scene.dispose_texture(texture)?;
        }
        tracing::info!(card = %self.card, "light resources torn down");
        Ok(())
    }

    /// Reconfiguration path: restarts the background construction with the
    /// new card configuration.
    pub fn update_shape(
        &mut self,
        scene: &mut dyn SceneBackend,
        card: &CardConfig,
    ) -> Result<(), SceneError> {
        self.construct_background(scene, card)
    }

    /// Starts (or performs, for synchronous cards) the background and
    /// environment construction. Without a data location this is a no-op
    /// and the scene keeps whatever it had.
    pub fn construct_background(
        &mut self,
        scene: &mut dyn SceneBackend,
        card: &CardConfig,
    ) -> Result<(), SceneError> {
        let Some(raw_location) = card.data_location.as_deref() else {
            return Ok(());
        };
        let Some(data_type) = card.resolved_data_type() else {
            tracing::warn!(location = raw_location, "background has no resolvable data type");
            return Ok(());
        };

        self.generation += 1;
        let location = DataLocation::parse(raw_location);

        if card.load_synchronously {
            match self.client.fetch(&location) {
                Ok(bytes) => {
                    let before = self.installed;
                    self.finish_load(scene, &bytes, data_type)?;
                    if self.installed > before {
                        self.bus.publish(
                            &Scope::Session,
                            Event::SynchronousCardLoaded {
                                card: self.card.clone(),
                            },
                        );
                    }
                }
                Err(error) => {
                    self.failed += 1;
                    tracing::warn!(%location, %error, "synchronous background fetch failed");
                }
            }
            return Ok(());
        }

        if let Err(error) = self.loader.begin(LoadRequest {
            generation: self.generation,
            location,
            data_type,
        }) {
            self.failed += 1;
            tracing::warn!(%error, "could not queue background load");
        }
        Ok(())
    }

    /// Per-frame hook: refreshes the shadow cascades against the current
    /// camera and drains background-load completions.
    pub fn update(&mut self, scene: &mut dyn SceneBackend) -> Result<(), SceneError> {
        if let Some(shadow) = self.shadow {
            scene.refresh_shadow_system(shadow)?;
        }

        while let Some(result) = self.loader.poll() {
            if result.generation != self.generation {
                self.discarded += 1;
                tracing::debug!(
                    generation = result.generation,
                    current = self.generation,
                    "discarding stale background load"
                );
                continue;
            }
            match result.outcome {
                Ok(bytes) => self.finish_load(scene, &bytes, result.data_type)?,
                Err(error) => {
                    self.failed += 1;
                    tracing::warn!(%error, "background load failed; keeping previous environment");
                }
            }
        }
        Ok(())
    }

    fn finish_load(
        &mut self,
        scene: &mut dyn SceneBackend,
        bytes: &[u8],
        data_type: DataType,
    ) -> Result<(), SceneError> {
        match self.install_environment(scene, bytes, data_type) {
            Ok(()) => {
                self.installed += 1;
                Ok(())
            }
            Err(error) if error.is_recoverable() => {
                self.failed += 1;
                tracing::warn!(%error, "keeping previous environment");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Decodes the payload, derives the pre-filtered environment map, and
    /// installs it as both background and environment.
    ///
    /// Disposal order matters because background and environment may alias
    /// one texture: the decoded source always goes; the previous background
    /// goes only when it is neither the previous environment nor the new
    /// map; the previous environment goes only when it is not the new map.
    fn install_environment(
        &mut self,
        scene: &mut dyn SceneBackend,
        bytes: &[u8],
        data_type: DataType,
    ) -> Result<(), SceneError> {
        let source = scene.decode_texture(bytes, data_type)?;
        let map = scene.prefilter_environment(source)?;

        let previous_background = scene.background();
        let previous_environment = scene.environment();
        scene.set_background(Some(map));
        scene.set_environment(Some(map));

        scene.dispose_texture(source)?;
        if let Some(texture) = previous_background {
            if previous_environment != Some(texture) && texture != map {
                scene.dispose_texture(texture)?;
            }
        }
        if let Some(texture) = previous_environment {
            if texture != map {
                scene.dispose_texture(texture)?;
            }
        }

        tracing::info!(card = %self.card, %data_type, "environment installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::headless::{png_fixture, HeadlessScene, TextureKind};

    fn manager() -> (LightResourceManager, Bus) {
        let bus = Bus::new();
        let manager =
            LightResourceManager::new(CardId::new("card-1"), bus.clone()).expect("manager");
        (manager, bus)
    }

    fn png_card(dir: &tempfile::TempDir, synchronous: bool) -> CardConfig {
        let path = dir.path().join("backdrop.png");
        std::fs::write(&path, png_fixture()).expect("write fixture");
        CardConfig {
            data_location: Some(path.display().to_string()),
            load_synchronously: synchronous,
            ..CardConfig::default()
        }
    }

    /// Pumps `update` until `predicate` holds or a deadline passes.
    fn pump_until(
        manager: &mut LightResourceManager,
        scene: &mut HeadlessScene,
        predicate: impl Fn(&LightResourceManager, &HeadlessScene) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate(manager, scene) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            manager.update(scene).expect("update");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn setup_builds_one_ambient_and_one_shadow() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &CardConfig::default(), Some(0x0000ff))
            .expect("setup");

        assert_eq!(scene.alive_lights(), 1);
        assert_eq!(scene.alive_shadows(), 1);
        let ambient = manager.ambient_light().expect("ambient light");
        assert_eq!(scene.light_color(ambient), Some(0x0000ff));
        assert_eq!(scene.light_intensity(ambient), Some(AMBIENT_INTENSITY));
    }

    #[test]
    fn missing_seed_color_defaults_to_white() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &CardConfig::default(), None)
            .expect("setup");
        let ambient = manager.ambient_light().expect("ambient light");
        assert_eq!(scene.light_color(ambient), Some(0xffffff));
    }

    #[test]
    fn repeated_setup_does_not_leak_or_duplicate() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        for _ in 0..3 {
            manager
                .setup(&mut scene, &CardConfig::default(), Some(0x123456))
                .expect("setup");
        }
        assert_eq!(scene.alive_lights(), 1);
        assert_eq!(scene.alive_shadows(), 1);
    }

    #[test]
    fn change_light_recolors_the_ambient() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &CardConfig::default(), Some(0x0000ff))
            .expect("setup");
        manager.change_light(&mut scene, 0x7f007f).expect("change");
        let ambient = manager.ambient_light().expect("ambient light");
        assert_eq!(scene.light_color(ambient), Some(0x7f007f));
    }

    #[test]
    fn change_light_is_a_noop_without_resources() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager.change_light(&mut scene, 0xff0000).expect("before setup");

        manager
            .setup(&mut scene, &CardConfig::default(), None)
            .expect("setup");
        manager.teardown(&mut scene).expect("teardown");
        manager.change_light(&mut scene, 0xff0000).expect("after teardown");
    }

    #[test]
    fn teardown_leaves_an_unconfigured_scene() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &png_card(&dir, true), Some(0x0000ff))
            .expect("setup");
        assert!(scene.environment().is_some());

        manager.teardown(&mut scene).expect("teardown");
        assert_eq!(scene.alive_lights(), 0);
        assert_eq!(scene.alive_shadows(), 0);
        assert_eq!(scene.alive_textures(), 0);
        assert!(scene.background().is_none());
        assert!(scene.environment().is_none());
    }

    #[test]
    fn background_without_location_changes_nothing() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &CardConfig::default(), None)
            .expect("setup");
        assert!(scene.background().is_none());
        assert!(scene.environment().is_none());
        assert_eq!(scene.alive_textures(), 0);
    }

    #[test]
    fn synchronous_load_installs_and_notifies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut manager, bus) = manager();
        let loaded = bus.subscribe(Scope::Session);
        let mut scene = HeadlessScene::default();

        manager
            .setup(&mut scene, &png_card(&dir, true), None)
            .expect("setup");

        let map = scene.environment().expect("environment installed");
        assert_eq!(scene.background(), Some(map));
        assert_eq!(scene.texture_kind(map), Some(TextureKind::Environment));
        // Only the derived map survives; the decoded source is disposed.
        assert_eq!(scene.alive_textures(), 1);
        assert!(matches!(
            loaded.try_next(),
            Some(Event::SynchronousCardLoaded { card }) if card == CardId::new("card-1")
        ));
    }

    #[test]
    fn asynchronous_load_installs_via_update() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();

        manager
            .setup(&mut scene, &png_card(&dir, false), None)
            .expect("setup");
        assert!(scene.environment().is_none());

        pump_until(&mut manager, &mut scene, |manager, _| {
            manager.loads_installed() == 1
        });
        assert!(scene.environment().is_some());
        assert_eq!(scene.alive_textures(), 1);
    }

    #[test]
    fn reconfiguration_replaces_the_environment_without_double_dispose() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();

        manager
            .setup(&mut scene, &png_card(&dir, true), None)
            .expect("setup");
        let first = scene.environment().expect("first environment");

        manager
            .update_shape(&mut scene, &png_card(&dir, true))
            .expect("update shape");
        let second = scene.environment().expect("second environment");
        assert_ne!(first, second);
        assert_eq!(scene.background(), Some(second));
        // Two decoded sources plus the replaced aliased map.
        assert_eq!(scene.alive_textures(), 1);
        assert_eq!(scene.disposed_textures(), 3);
    }

    #[test]
    fn stale_completion_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &CardConfig::default(), None)
            .expect("setup");

        // Two reconfigurations back to back: the first load is stale before
        // it ever completes.
        manager
            .update_shape(&mut scene, &png_card(&dir, false))
            .expect("first update");
        manager
            .update_shape(&mut scene, &png_card(&dir, false))
            .expect("second update");

        pump_until(&mut manager, &mut scene, |manager, _| {
            manager.loads_installed() == 1 && manager.loads_discarded() == 1
        });
        // Exactly one install happened: one live map, one disposed source.
        assert_eq!(scene.alive_textures(), 1);
        assert_eq!(scene.disposed_textures(), 1);
    }

    #[test]
    fn failed_load_keeps_previous_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &png_card(&dir, true), None)
            .expect("setup");
        let installed = scene.environment().expect("environment installed");

        let garbage = dir.path().join("broken.png");
        std::fs::write(&garbage, b"definitely not a png").expect("write fixture");
        let card = CardConfig {
            data_location: Some(garbage.display().to_string()),
            ..CardConfig::default()
        };
        manager.update_shape(&mut scene, &card).expect("update shape");

        pump_until(&mut manager, &mut scene, |manager, _| {
            manager.loads_failed() == 1
        });
        assert_eq!(scene.environment(), Some(installed));
        assert_eq!(scene.background(), Some(installed));
    }

    #[test]
    fn update_refreshes_the_shadow_cascades() {
        let (mut manager, _bus) = manager();
        let mut scene = HeadlessScene::default();
        manager
            .setup(&mut scene, &CardConfig::default(), None)
            .expect("setup");
        let shadow = manager.shadow_system().expect("shadow system");

        manager.update(&mut scene).expect("update");
        manager.update(&mut scene).expect("update");
        assert_eq!(scene.shadow_refreshes(shadow), Some(2));
    }
}
