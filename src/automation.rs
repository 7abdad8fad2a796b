// src/automation.rs
//
// Gain automation timelines.
//
// A GainParam is a time-ordered list of gain events evaluated against the
// audio clock, with the same vocabulary as a web-audio AudioParam:
// set-at, linear-ramp-to, exponential approach to a target, and
// cancellation. The engine evaluates it per sample; the control side only
// ever appends events through render commands.

/// One automation event. Times are audio-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainEvent {
    /// Jump to `value` at `time`.
    SetValue { time: f64, value: f32 },

    /// Ramp linearly from the previous event's value, reaching `value` at `time`.
    LinearRamp { time: f64, value: f32 },

    /// From `time`, approach `target` exponentially with `time_constant` seconds.
    SetTarget {
        time: f64,
        target: f32,
        time_constant: f64,
    },
}

impl GainEvent {
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            GainEvent::SetValue { time, .. }
            | GainEvent::LinearRamp { time, .. }
            | GainEvent::SetTarget { time, .. } => time,
        }
    }
}

/// Operations the control side can request on a gain timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainOp {
    Schedule(GainEvent),

    /// Drop every event at or after `time`.
    Cancel { time: f64 },

    /// Drop every event at or after `time` and pin the value the curve had
    /// at `time`, so a following ramp starts from where the sound is.
    CancelAndHold { time: f64 },
}

/// Value of a curve segment that started at `time` with `value`.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    time: f64,
    value: f32,
    target: Option<(f32, f64)>,
}

impl Anchor {
    #[inline]
    fn value_at(&self, t: f64) -> f32 {
        match self.target {
            None => self.value,
            Some((target, time_constant)) => {
                if time_constant <= 0.0 {
                    return target;
                }
                let elapsed = (t - self.time).max(0.0);
                let decay = (-elapsed / time_constant).exp() as f32;
                target + (self.value - target) * decay
            }
        }
    }
}

/// An automatable gain.
#[derive(Debug, Clone)]
pub struct GainParam {
    initial: f32,
    events: Vec<GainEvent>,
}

impl GainParam {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    /// Apply a control-side operation.
    pub fn apply(&mut self, op: GainOp) {
        match op {
            GainOp::Schedule(event) => self.schedule(event),
            GainOp::Cancel { time } => self.cancel(time),
            GainOp::CancelAndHold { time } => self.cancel_and_hold(time),
        }
    }

    /// Insert an event, keeping the list ordered by time. Events at equal
    /// times keep insertion order.
    pub fn schedule(&mut self, event: GainEvent) {
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
    }

    pub fn cancel(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        self.cancel(time);
        self.events.push(GainEvent::SetValue { time, value: held });
    }

    /// Evaluate the curve at audio time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut anchor = Anchor {
            time: f64::NEG_INFINITY,
            value: self.initial,
            target: None,
        };

        for event in &self.events {
            match *event {
                GainEvent::SetValue { time, value } => {
                    if time > t {
                        break;
                    }
                    anchor = Anchor {
                        time,
                        value,
                        target: None,
                    };
                }

                GainEvent::LinearRamp { time, value } => {
                    if time > t {
                        let start_time = if anchor.time.is_finite() {
                            anchor.time
                        } else {
                            return anchor.value_at(t);
                        };
                        let start_value = anchor.value_at(start_time);
                        let span = time - start_time;
                        if span <= 0.0 {
                            return value;
                        }
                        let progress = ((t - start_time) / span) as f32;
                        return start_value + (value - start_value) * progress;
                    }
                    anchor = Anchor {
                        time,
                        value,
                        target: None,
                    };
                }

                GainEvent::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    if time > t {
                        break;
                    }
                    anchor = Anchor {
                        time,
                        value: anchor.value_at(time),
                        target: Some((target, time_constant)),
                    };
                }
            }
        }

        anchor.value_at(t)
    }

    /// Fold events that lie entirely in the past into a single starting
    /// point. Keeps per-sample evaluation short on long-lived voices.
    pub fn compact(&mut self, now: f64) {
        let settled = self
            .events
            .iter()
            .rposition(|e| e.time() <= now && !matches!(e, GainEvent::SetTarget { .. }));

        if let Some(index) = settled {
            if index > 0 {
                let time = self.events[index].time();
                let value = self.value_at(time);
                self.events.drain(..=index);
                self.events.insert(0, GainEvent::SetValue { time, value });
            }
        }
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl Default for GainParam {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn scheduled_note() -> GainParam {
        let mut gain = GainParam::new(0.0);
        gain.schedule(GainEvent::SetValue { time: 1.0, value: 0.0 });
        gain.schedule(GainEvent::LinearRamp { time: 1.02, value: 0.12 });
        gain.schedule(GainEvent::SetValue { time: 1.45, value: 0.12 });
        gain.schedule(GainEvent::LinearRamp { time: 1.5, value: 0.0 });
        gain
    }

    #[test]
    fn test_attack_hold_release_shape() {
        let gain = scheduled_note();
        assert_eq!(gain.value_at(0.5), 0.0);
        assert!(close(gain.value_at(1.01), 0.06));
        assert!(close(gain.value_at(1.02), 0.12));
        assert!(close(gain.value_at(1.3), 0.12));
        assert!(close(gain.value_at(1.475), 0.06));
        assert_eq!(gain.value_at(1.6), 0.0);
    }

    #[test]
    fn test_set_target_approaches_exponentially() {
        let mut gain = GainParam::new(0.0);
        gain.schedule(GainEvent::SetTarget {
            time: 0.0,
            target: 1.0,
            time_constant: 0.01,
        });
        assert!(close(gain.value_at(0.01), 1.0 - (-1.0f32).exp()));
        assert!(gain.value_at(0.1) > 0.9999);
    }

    #[test]
    fn test_cancel_and_hold_pins_current_value() {
        let mut gain = GainParam::new(0.0);
        gain.schedule(GainEvent::SetValue { time: 0.0, value: 0.0 });
        gain.schedule(GainEvent::LinearRamp { time: 1.0, value: 1.0 });

        gain.cancel_and_hold(0.5);
        gain.schedule(GainEvent::LinearRamp { time: 0.6, value: 0.0 });

        assert!(close(gain.value_at(0.5), 0.5));
        assert!(close(gain.value_at(0.55), 0.25));
        assert_eq!(gain.value_at(0.7), 0.0);
    }

    #[test]
    fn test_cancel_drops_future_events() {
        let mut gain = scheduled_note();
        gain.cancel(1.4);
        assert!(close(gain.value_at(2.0), 0.12));
    }

    #[test]
    fn test_compact_preserves_curve() {
        let mut gain = scheduled_note();
        let before: Vec<f32> = (0..40).map(|i| gain.value_at(1.3 + i as f64 * 0.01)).collect();

        gain.compact(1.3);
        assert_eq!(gain.event_count(), 3);

        let after: Vec<f32> = (0..40).map(|i| gain.value_at(1.3 + i as f64 * 0.01)).collect();
        for (a, b) in before.iter().zip(&after) {
            assert!(close(*a, *b));
        }
    }
}
