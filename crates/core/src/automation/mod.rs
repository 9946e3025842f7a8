//! Schedulable parameter curves.
//!
//! Mirrors the audio clock's automation contract: values are anchored at
//! absolute timestamps and reached with linear or exponential ramps from the
//! previous anchor. Because everything is timestamp-based, a curve built a
//! whole look-ahead window before its onset evaluates identically no matter
//! when construction happened.

/// How a scheduled value is reached from the previous anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampKind {
    /// Jump to the value at the given time.
    Set,
    /// Interpolate linearly from the previous anchor.
    Linear,
    /// Interpolate exponentially from the previous anchor. Both endpoint
    /// values must be non-zero and share a sign.
    Exponential,
}

/// One automation anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    pub time: f64,
    pub value: f32,
    pub ramp: RampKind,
}

/// A parameter automation curve evaluated at absolute clock times.
///
/// Anchors must be appended in non-decreasing time order, which the builder
/// methods naturally produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamCurve {
    events: Vec<ParamEvent>,
}

impl ParamCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors `value` at `time` with no interpolation.
    pub fn set_value_at(mut self, time: f64, value: f32) -> Self {
        self.push(time, value, RampKind::Set);
        self
    }

    /// Ramps linearly from the previous anchor to `value` at `time`.
    pub fn linear_ramp_to(mut self, time: f64, value: f32) -> Self {
        self.push(time, value, RampKind::Linear);
        self
    }

    /// Ramps exponentially from the previous anchor to `value` at `time`.
    pub fn exponential_ramp_to(mut self, time: f64, value: f32) -> Self {
        self.push(time, value, RampKind::Exponential);
        self
    }

    fn push(&mut self, time: f64, value: f32, ramp: RampKind) {
        debug_assert!(
            self.events.last().map_or(true, |last| last.time <= time),
            "automation anchors must be appended in time order"
        );
        self.events.push(ParamEvent { time, value, ramp });
    }

    /// The raw anchor list, in time order.
    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    /// Evaluates the curve at an absolute time. Before the first anchor the
    /// first value holds; after the last anchor the last value holds.
    pub fn value_at(&self, time: f64) -> f32 {
        let Some(first) = self.events.first() else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }

        let mut index = 0;
        for (i, event) in self.events.iter().enumerate() {
            if event.time <= time {
                index = i;
            } else {
                break;
            }
        }

        let current = self.events[index];
        match self.events.get(index + 1) {
            Some(next) if next.ramp != RampKind::Set => {
                let span = next.time - current.time;
                if span <= f64::EPSILON {
                    return next.value;
                }
                let frac = ((time - current.time) / span) as f32;
                match next.ramp {
                    RampKind::Linear => current.value + (next.value - current.value) * frac,
                    RampKind::Exponential => current.value * (next.value / current.value).powf(frac),
                    RampKind::Set => unreachable!(),
                }
            }
            _ => current.value,
        }
    }
}
