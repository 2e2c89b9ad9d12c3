//! Capture decision state machine
//!
//! Turns motion events into writer commands. States are an explicit tagged
//! value advanced by pure transition steps — `on_frame` swaps the old state
//! for the one the step returns — so the session lifecycle is auditable and
//! testable without hardware or a clock: the caller passes `now` in.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use perch_core::{CaptureMode, ControllerConfig, MotionEvent};

/// Commands the controller issues to the media writer.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureAction {
    /// Open a capture session; artifact naming derives from `started`.
    OpenSession {
        started: DateTime<Utc>,
        trigger_score: f32,
    },
    /// Persist the current full-resolution frame as photo `index` (1-based).
    CapturePhoto { index: u32 },
    /// Append the current frame to the session's clip buffer.
    AppendClipFrame,
    /// Finalize the session's artifact(s).
    CloseSession,
    /// Discard the session's partial artifact(s).
    AbortSession,
}

/// Book-keeping for the one open capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub opened: Instant,
    pub started: DateTime<Utc>,
    pub last_motion: Instant,
    pub peak_score: f32,
    pub photos_taken: u32,
    pub last_photo: Option<Instant>,
    pub clip_frames: u64,
}

/// Controller states. `Triggered` is the accepted-motion transition state;
/// it is stepped through within the tick that accepts the event and never
/// persists across ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Idle,
    Triggered,
    Capturing(Session),
    Cooldown { since: Instant },
}

pub struct CaptureController {
    config: ControllerConfig,
    state: State,
}

impl CaptureController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, State::Capturing(_))
    }

    /// Advance one tick. `motion` is the detector's event for this frame,
    /// if it fired.
    pub fn on_frame(&mut self, now: Instant, motion: Option<&MotionEvent>) -> Vec<CaptureAction> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        let (next, actions) = Self::step(&self.config, state, now, motion);
        self.state = next;
        actions
    }

    /// A write failure (or any unexpected capture-path error) aborts the
    /// session and moves straight to cooldown, so the still-present stimulus
    /// cannot immediately re-trigger on the same scene.
    pub fn on_write_failure(&mut self, now: Instant) -> Vec<CaptureAction> {
        if let State::Capturing(_) = self.state {
            warn!("aborting capture session after write failure");
            self.state = State::Cooldown { since: now };
            vec![CaptureAction::AbortSession]
        } else {
            Vec::new()
        }
    }

    /// Pure transition step: `(state, input) -> (state', actions)`.
    fn step(
        config: &ControllerConfig,
        state: State,
        now: Instant,
        motion: Option<&MotionEvent>,
    ) -> (State, Vec<CaptureAction>) {
        match state {
            State::Idle => match motion {
                None => (State::Idle, Vec::new()),
                Some(_) => Self::step(config, State::Triggered, now, motion),
            },

            State::Triggered => {
                let event = motion.expect("Triggered is only entered on a motion event");
                info!(score = event.score, "motion accepted, opening capture session");
                let mut session = Session {
                    opened: now,
                    started: event.at,
                    last_motion: now,
                    peak_score: event.score,
                    photos_taken: 0,
                    last_photo: None,
                    clip_frames: 0,
                };
                let mut actions = vec![CaptureAction::OpenSession {
                    started: event.at,
                    trigger_score: event.score,
                }];
                // The triggering frame is always persisted, so momentary
                // motion still yields at least one still.
                match config.mode {
                    CaptureMode::Photo { count, .. } => {
                        session.photos_taken = 1;
                        session.last_photo = Some(now);
                        actions.push(CaptureAction::CapturePhoto { index: 1 });
                        if session.photos_taken >= count {
                            info!(photos = session.photos_taken, "capture session complete");
                            actions.push(CaptureAction::CloseSession);
                            return (State::Cooldown { since: now }, actions);
                        }
                    }
                    CaptureMode::Video => {
                        session.clip_frames = 1;
                        actions.push(CaptureAction::AppendClipFrame);
                    }
                }
                (State::Capturing(session), actions)
            }

            State::Capturing(mut session) => {
                if let Some(event) = motion {
                    session.last_motion = now;
                    session.peak_score = session.peak_score.max(event.score);
                }
                match config.mode {
                    CaptureMode::Photo { count, spacing } => {
                        let mut actions = Vec::new();
                        let due = session
                            .last_photo
                            .map_or(true, |t| now.duration_since(t) >= spacing);
                        if due && session.photos_taken < count {
                            session.photos_taken += 1;
                            session.last_photo = Some(now);
                            actions.push(CaptureAction::CapturePhoto {
                                index: session.photos_taken,
                            });
                        }
                        if session.photos_taken >= count {
                            info!(photos = session.photos_taken, "capture session complete");
                            actions.push(CaptureAction::CloseSession);
                            (State::Cooldown { since: now }, actions)
                        } else {
                            (State::Capturing(session), actions)
                        }
                    }
                    CaptureMode::Video => {
                        let elapsed = now.duration_since(session.opened);
                        let quiet = now.duration_since(session.last_motion);
                        let quiet_done =
                            elapsed >= config.min_duration && quiet >= config.quiet_period;
                        if elapsed >= config.max_duration || quiet_done {
                            info!(
                                secs = elapsed.as_secs_f64(),
                                frames = session.clip_frames,
                                "closing clip"
                            );
                            (
                                State::Cooldown { since: now },
                                vec![CaptureAction::CloseSession],
                            )
                        } else {
                            session.clip_frames += 1;
                            (
                                State::Capturing(session),
                                vec![CaptureAction::AppendClipFrame],
                            )
                        }
                    }
                }
            }

            State::Cooldown { since } => {
                if now.duration_since(since) >= config.cooldown {
                    debug!("cooldown complete");
                    // Motion arriving on the expiry tick does not trigger;
                    // the next event will.
                    (State::Idle, Vec::new())
                } else {
                    (State::Cooldown { since }, Vec::new())
                }
            }
        }
    }
}
