use std::thread;
use std::time::{Duration, Instant};

use animator::{ToggleAnimator, TriggerOutcome, TICK};
use anyhow::{Context, Result};
use lightbus::{Bus, CardId, Event, Scope, Ticker};
use lightconfig::CardConfig;
use lightscene::{HeadlessScene, LightResourceManager};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::stimulus::StimulusSource;

/// How often the loop wakes to poll; a fraction of the tick period so tick
/// deadlines are never missed by a full period.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let card = load_card(&args)?;
    let card_id = CardId::new("light");
    let bus = Bus::new();
    let stimulus_events = bus.subscribe(Scope::Light);
    let card_events = bus.subscribe(Scope::Card(card_id.clone()));
    let session_events = bus.subscribe(Scope::Session);

    let mut scene = HeadlessScene::default();
    let mut manager = LightResourceManager::new(card_id.clone(), bus.clone())
        .context("failed to start the resource manager")?;
    let mut animator = ToggleAnimator::new(&card);
    let mut ticker = Ticker::new(TICK);

    manager.setup(&mut scene, &card, Some(animator.current_color()))?;
    StimulusSource::new(bus.clone(), &card)
        .spawn(args.trigger_every)
        .context("failed to start the stimulus source")?;

    tracing::info!(
        trigger_every = %humantime::format_duration(args.trigger_every),
        run_for = ?args.run_for,
        "worldlight daemon running"
    );

    let started = Instant::now();
    loop {
        let now = Instant::now();

        // Authoritative side: stimulus taps drive the toggle state machine
        // and the single repeating tick timer.
        while let Some(event) = stimulus_events.try_next() {
            if let Event::Trigger = event {
                match animator.trigger() {
                    TriggerOutcome::Started(_) => ticker.arm(now),
                    TriggerOutcome::Reversed(_) => ticker.disarm(),
                }
            }
        }
        for _ in 0..ticker.poll(now) {
            match animator.tick() {
                Some(color) => {
                    bus.publish(&Scope::Card(card_id.clone()), Event::ChangeLight(color));
                }
                None => break,
            }
        }
        if !animator.is_animating() {
            ticker.disarm();
        }

        // Rendering side: apply replicated events to the scene resources.
        for event in card_events.drain() {
            match event {
                Event::ChangeLight(color) => manager.change_light(&mut scene, color)?,
                Event::UpdateShape(config) => manager.update_shape(&mut scene, &config)?,
                other => tracing::debug!(%other, "ignoring card event"),
            }
        }
        while let Some(event) = session_events.try_next() {
            tracing::info!(%event, "session notification");
        }
        manager.update(&mut scene)?;

        if let Some(limit) = args.run_for {
            if started.elapsed() >= limit {
                break;
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    manager.teardown(&mut scene)?;
    tracing::info!(
        installed = manager.loads_installed(),
        discarded = manager.loads_discarded(),
        failed = manager.loads_failed(),
        "worldlight daemon stopped"
    );
    Ok(())
}

fn load_card(args: &RunArgs) -> Result<CardConfig> {
    let mut card = match &args.config {
        Some(path) => CardConfig::load(path).with_context(|| {
            format!("failed to load card configuration from {}", path.display())
        })?,
        None => CardConfig::default(),
    };

    if let Some(location) = &args.data_location {
        card.data_location = Some(location.clone());
    }
    if let Some(duration) = args.duration {
        card.duration = Some(duration);
    }
    card.validate()
        .context("card configuration is invalid after command-line overrides")?;
    Ok(card)
}
