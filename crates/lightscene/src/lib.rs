//! Rendering-side resource lifecycle for the replicated light.
//!
//! The crate is split the same way the responsibilities are:
//! - [`scene`] defines the injected [`SceneBackend`] contract: everything
//!   the manager needs from a host renderer (lights, shadow systems,
//!   texture decode/prefilter, background/environment slots).
//! - [`shadow`] carries the fixed 3-cascade shadow configuration and the
//!   practical split computation refreshed every frame.
//! - [`headless`] is the reference backend with full alive/disposed
//!   accounting, used by the daemon and by tests.
//! - [`manager`] owns the lifecycle: setup, teardown, color updates, and
//!   the generation-guarded background/environment installs.

mod headless;
mod manager;
mod scene;
mod shadow;

pub use headless::{HeadlessScene, TextureKind};
pub use manager::{LightResourceManager, AMBIENT_INTENSITY};
pub use scene::{LightId, SceneBackend, SceneError, ShadowId, TextureId};
pub use shadow::{practical_splits, ShadowSettings};
