use std::io;
use std::thread;
use std::time::Duration;

use lightbus::{Bus, Event, Scope};
use lightconfig::CardConfig;

/// Stand-in for the clickable stimulus box.
///
/// The real box lives in a host renderer; all the core ever sees from it is
/// `trigger` on the shared light scope, so that is all this emits. The tint
/// and shadow flag are carried from configuration for a host that wants to
/// draw it.
pub struct StimulusSource {
    bus: Bus,
    color: [u8; 3],
    shadow: bool,
}

impl StimulusSource {
    pub fn new(bus: Bus, card: &CardConfig) -> Self {
        Self {
            bus,
            color: card.stimulus_color(),
            shadow: card.shadow,
        }
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    pub fn shadow(&self) -> bool {
        self.shadow
    }

    /// One tap: publishes `trigger` to every light-scope subscriber.
    pub fn tap(&self) {
        self.bus.publish(&Scope::Light, Event::Trigger);
    }

    /// Moves the source onto a thread that taps at a fixed interval.
    pub fn spawn(self, every: Duration) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new().name("stimulus".into()).spawn(move || {
            tracing::debug!(every = ?every, "stimulus source running");
            loop {
                thread::sleep(every);
                self.tap();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_publishes_a_trigger_on_the_light_scope() {
        let bus = Bus::new();
        let sub = bus.subscribe(Scope::Light);
        let source = StimulusSource::new(bus, &CardConfig::default());
        source.tap();
        source.tap();
        assert_eq!(sub.drain().len(), 2);
    }

    #[test]
    fn carries_the_configured_tint() {
        let card = CardConfig::from_toml_str("color = [32, 32, 32]\nshadow = true").unwrap();
        let source = StimulusSource::new(Bus::new(), &card);
        assert_eq!(source.color(), [32, 32, 32]);
        assert!(source.shadow());
    }
}
