//! Dimmer configuration and time-of-day level computation.
//!
//! A dimmer ramps one light port up over a sunrise window and down over a
//! sunset window. Outside both windows the level holds at whichever end
//! the most recently finished window left it: full target after sunrise,
//! zero after sunset. Windows may cross midnight.

mod curve;

pub use curve::{CurveParams, CurveShape};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{RoomHubError, ValidationError};
use crate::id::{ControllerId, DimmerConfigId, WorkflowId};
use crate::time::{MINUTES_PER_DAY, minute_of_day, minutes_since};

/// One ramp window within a day.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    start: f64,
    duration: f64,
}

impl Window {
    fn new(start: NaiveTime, duration_mins: u32) -> Self {
        Self {
            start: minute_of_day(start),
            duration: f64::from(duration_mins),
        }
    }

    /// Progress through the window, `None` when `minute` is outside.
    fn progress(&self, minute: f64) -> Option<f64> {
        let elapsed = minutes_since(self.start, minute);
        (elapsed < self.duration).then(|| elapsed / self.duration)
    }

    fn minutes_since_end(&self, minute: f64) -> f64 {
        minutes_since(self.start + self.duration, minute)
    }

    fn overlaps(&self, other: &Self) -> bool {
        minutes_since(self.start, other.start) < self.duration
            || minutes_since(other.start, self.start) < other.duration
    }
}

/// Sunrise/sunset ramp for one `(workflow, controller, port)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimmerConfig {
    pub id: DimmerConfigId,
    pub workflow_id: WorkflowId,
    pub controller_id: ControllerId,
    pub port: u8,
    pub sunrise_time: NaiveTime,
    pub sunrise_duration_mins: u32,
    #[serde(default)]
    pub sunrise_curve: CurveShape,
    pub sunset_time: NaiveTime,
    pub sunset_duration_mins: u32,
    #[serde(default)]
    pub sunset_curve: CurveShape,
    pub target_intensity: u8,
    pub is_active: bool,
}

impl DimmerConfig {
    fn sunrise(&self) -> Window {
        Window::new(self.sunrise_time, self.sunrise_duration_mins)
    }

    fn sunset(&self) -> Window {
        Window::new(self.sunset_time, self.sunset_duration_mins)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::Validation`] when the target intensity is
    /// above 100, a window lasts a full day or more, or the two windows
    /// overlap.
    pub fn validate(&self) -> Result<(), RoomHubError> {
        if self.target_intensity > 100 {
            return Err(ValidationError::IntensityOutOfRange(self.target_intensity).into());
        }
        for duration in [self.sunrise_duration_mins, self.sunset_duration_mins] {
            if duration >= MINUTES_PER_DAY {
                return Err(ValidationError::WindowTooLong(duration).into());
            }
        }
        if self.sunrise().overlaps(&self.sunset()) {
            return Err(ValidationError::OverlappingWindows.into());
        }
        Ok(())
    }

    /// Exact level, `0.0..=target`, at a fractional minute of the day.
    #[must_use]
    pub fn level_at(&self, minute: f64, params: &CurveParams) -> f64 {
        let target = f64::from(self.target_intensity);
        let sunrise = self.sunrise();
        let sunset = self.sunset();

        if let Some(t) = sunrise.progress(minute) {
            return self.sunrise_curve.apply(t, params) * target;
        }
        if let Some(t) = sunset.progress(minute) {
            return (1.0 - self.sunset_curve.apply(t, params)) * target;
        }
        if sunrise.minutes_since_end(minute) < sunset.minutes_since_end(minute) {
            target
        } else {
            0.0
        }
    }

    /// Level rounded to a whole command value at a time of day.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn command_level_at(&self, time: NaiveTime, params: &CurveParams) -> u8 {
        let level = self.level_at(minute_of_day(time), params).round();
        level.clamp(0.0, f64::from(self.target_intensity.min(100))) as u8
    }
}
