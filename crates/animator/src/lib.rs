//! Authoritative toggle/interpolation state machine.
//!
//! The animator owns the replicated toggle state: which endpoint color the
//! light is swinging toward, how far along it is, and the packed color every
//! rendering replica should display. It is deliberately pure: the driving
//! loop arms a single repeating timer when [`ToggleAnimator::trigger`]
//! starts a run and calls [`ToggleAnimator::tick`] once per elapsed period,
//! publishing each returned color. Every replica computing the same discrete
//! steps from the same state reaches the same colors.

use std::time::Duration;

use lightconfig::CardConfig;

/// Animation tick period; the duration/step arithmetic is defined in these
/// units (default 1.6 s duration = 32 steps).
pub const TICK: Duration = Duration::from_millis(50);

/// Which endpoint a run moves toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToA,
    ToB,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::ToA => Direction::ToB,
            Direction::ToB => Direction::ToA,
        }
    }
}

/// Animation phase.
///
/// The original encoded this as a `changing` flag plus the pending
/// direction, which admits contradictory combinations; the explicit
/// three-state form does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    TowardA,
    TowardB,
}

/// What a trigger did, so the driver knows how to manage the tick timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run started in the given direction; arm the timer.
    Started(Direction),
    /// An in-flight run was halted and the next direction flipped to the
    /// given value; disarm the timer.
    Reversed(Direction),
}

/// Packs an RGB triple as 0x00RRGGBB.
pub fn pack_rgb(color: [u8; 3]) -> u32 {
    ((color[0] as u32) << 16) | ((color[1] as u32) << 8) | color[2] as u32
}

/// Componentwise linear interpolation, truncated toward zero.
///
/// Truncation keeps the blue/red midpoint at 0x7F007F and the clamped
/// endpoints exactly on the configured colors.
pub fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 3];
    for (slot, (&from, &to)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *slot = (from as f32 + (to as f32 - from as f32) * t) as u8;
    }
    out
}

pub struct ToggleAnimator {
    color_a: [u8; 3],
    color_b: [u8; 3],
    ratio: f32,
    phase: Phase,
    next_direction: Direction,
    current_color: u32,
    step: f32,
}

impl ToggleAnimator {
    /// Builds the animator from card configuration, applying the stated
    /// defaults: blue/red endpoints, ratio 0, next run toward B.
    pub fn new(card: &CardConfig) -> Self {
        let color_a = card.color_a();
        let color_b = card.color_b();
        let steps = card.animation_duration().as_secs_f32() / TICK.as_secs_f32();
        Self {
            color_a,
            color_b,
            ratio: 0.0,
            phase: Phase::Idle,
            next_direction: Direction::ToB,
            current_color: pack_rgb(color_a),
            step: 1.0 / steps,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn next_direction(&self) -> Direction {
        self.next_direction
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// The packed color every rendering replica should currently display.
    pub fn current_color(&self) -> u32 {
        self.current_color
    }

    pub fn is_animating(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Handles one stimulus event; safe to call mid-animation.
    ///
    /// A trigger while a run is in flight acts as a reverse/stop command:
    /// the run halts and the *next* trigger will start in the opposite
    /// direction. This debounce behavior is part of the replicated contract.
    pub fn trigger(&mut self) -> TriggerOutcome {
        if self.is_animating() {
            self.phase = Phase::Idle;
            self.next_direction = self.next_direction.flipped();
            tracing::debug!(next = ?self.next_direction, "animation reversed and halted");
            return TriggerOutcome::Reversed(self.next_direction);
        }

        self.phase = match self.next_direction {
            Direction::ToA => Phase::TowardA,
            Direction::ToB => Phase::TowardB,
        };
        tracing::debug!(direction = ?self.next_direction, ratio = self.ratio, "animation started");
        TriggerOutcome::Started(self.next_direction)
    }

    /// Advances one step, returning the recomputed packed color, or `None`
    /// when idle (the driver should disarm its timer on `None` or whenever
    /// the phase comes back idle).
    pub fn tick(&mut self) -> Option<u32> {
        let delta = match self.phase {
            Phase::Idle => return None,
            Phase::TowardA => -self.step,
            Phase::TowardB => self.step,
        };
        Some(self.update_by(delta))
    }

    fn update_by(&mut self, delta: f32) -> u32 {
        self.ratio = (self.ratio + delta).clamp(0.0, 1.0);
        if self.ratio >= 1.0 {
            self.ratio = 1.0;
            self.phase = Phase::Idle;
            self.next_direction = Direction::ToA;
        } else if self.ratio <= 0.0 {
            self.ratio = 0.0;
            self.phase = Phase::Idle;
            self.next_direction = Direction::ToB;
        }

        self.current_color = pack_rgb(lerp_rgb(self.color_a, self.color_b, self.ratio));
        tracing::trace!(
            ratio = self.ratio,
            color = format_args!("{:#08x}", self.current_color),
            "tick"
        );
        self.current_color
    }
}
