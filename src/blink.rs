//! Frame-sequence generation: expands a blink pattern into a flat, timed
//! sequence of eye states.

use crate::model::{BlinkSettings, EyeState, Frame, LoopPattern, LoopStep};

/// Floor on the number of transition frames emitted for one blink, so the
/// motion stays perceptible at high frame rates or very short blink speeds.
const MIN_BLINK_FRAMES: u32 = 6;

/// Expand one full blink (open -> closed -> open) into frames, optionally
/// holding the closed state for `closed_hold` seconds.
///
/// The transition is asymmetric: a quarter of the frames on each half-open
/// phase, a third and change on the closed phase, then the mirror, and
/// exactly one trailing fully-open frame so the next event starts from a
/// clean open state.
pub fn single_blink(speed: f64, fps: u32, closed_hold: f64) -> Vec<Frame> {
    let frame_ms = 1000.0 / fps as f64;
    let blink_frames = ((speed * fps as f64).round() as u32).max(MIN_BLINK_FRAMES);

    let half = ((blink_frames as f64 * 0.25).floor() as u32).max(1);
    let closed = ((blink_frames as f64 * 0.35).floor() as u32).max(2);
    // The rounded phase split can undercut the floor for very short blinks;
    // the closed phase absorbs the deficit.
    let closed = closed.max(MIN_BLINK_FRAMES.saturating_sub(2 * half));
    let hold = (closed_hold * fps as f64).round().max(0.0) as u32;

    let mut frames = Vec::with_capacity((2 * half + closed + hold + 1) as usize);
    let push = |frames: &mut Vec<Frame>, state: EyeState, count: u32| {
        for _ in 0..count {
            frames.push(Frame {
                state,
                duration_ms: frame_ms,
            });
        }
    };

    push(&mut frames, EyeState::Half, half);
    push(&mut frames, EyeState::Closed, closed);
    push(&mut frames, EyeState::Closed, hold);
    push(&mut frames, EyeState::Half, half);
    push(&mut frames, EyeState::Open, 1);
    frames
}

/// Expand one step: `blink_count` blinks separated by open filler, the
/// closed hold on the final blink only, then the pause filler.
pub fn expand_step(step: &LoopStep, fps: u32) -> Vec<Frame> {
    let frame_ms = 1000.0 / fps as f64;
    let mut frames = Vec::new();

    let filler = |frames: &mut Vec<Frame>, seconds: f64| {
        let count = (seconds * fps as f64).round().max(0.0) as u32;
        for _ in 0..count {
            frames.push(Frame {
                state: EyeState::Open,
                duration_ms: frame_ms,
            });
        }
    };

    for i in 0..step.blink_count {
        let last = i == step.blink_count - 1;
        let hold = if last { step.closed_hold } else { 0.0 };
        frames.extend(single_blink(step.blink_speed, fps, hold));
        if !last {
            filler(&mut frames, step.blink_interval);
        }
    }
    filler(&mut frames, step.pause_duration);
    frames
}

/// Repeat the pattern's steps in order until the accumulated *nominal* step
/// duration covers `animation_length`, breaking mid-pattern if necessary.
///
/// The accumulator uses [`LoopStep::nominal_duration`] rather than the
/// summed frame durations; the two can drift by a fraction of a frame
/// interval per step, which only affects where the loop cuts off, never the
/// timing of emitted frames. Pure and deterministic.
pub fn pattern_frames(pattern: &LoopPattern, settings: &BlinkSettings) -> Vec<Frame> {
    let mut frames = Vec::new();
    let total = settings.animation_length;
    let mut current = 0.0;

    'outer: while current < total {
        for step in pattern.steps() {
            frames.extend(expand_step(step, settings.fps));
            current += step.nominal_duration();
            if current >= total {
                break 'outer;
            }
        }
        // A pattern whose nominal duration is zero would never advance the
        // counter; emit one pass and stop.
        if pattern.nominal_duration() <= 0.0 {
            break;
        }
    }
    frames
}

/// Merge adjacent frame pairs: the first frame's state carries, durations
/// sum, an unpaired trailing frame passes through. Halves the frame count
/// without changing the total elapsed time.
pub fn reduce_frame_density(frames: &[Frame]) -> Vec<Frame> {
    frames
        .chunks(2)
        .map(|pair| match pair {
            [first, second] => Frame {
                state: first.state,
                duration_ms: first.duration_ms + second.duration_ms,
            },
            _ => pair[0],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepSpec;

    fn pattern_of(specs: &[StepSpec]) -> LoopPattern {
        LoopPattern::from_specs(specs).unwrap()
    }

    fn neutral_spec() -> StepSpec {
        StepSpec {
            blink_count: 1,
            blink_speed: 0.15,
            blink_interval: 0.2,
            pause_duration: 3.0,
            closed_hold: 0.0,
        }
    }

    fn total_ms(frames: &[Frame]) -> f64 {
        frames.iter().map(|f| f.duration_ms).sum()
    }

    #[test]
    fn single_blink_meets_frame_floor_across_parameter_space() {
        for fps in 10..=30 {
            for speed in [0.05, 0.1, 0.15, 0.3, 0.5, 0.7] {
                let frames = single_blink(speed, fps, 0.0);
                assert!(
                    frames.len() >= 7,
                    "fps={fps} speed={speed} produced only {} frames",
                    frames.len()
                );
                assert_eq!(frames.last().unwrap().state, EyeState::Open);
                let open_count = frames
                    .iter()
                    .filter(|f| f.state == EyeState::Open)
                    .count();
                assert_eq!(open_count, 1, "fps={fps} speed={speed}");
            }
        }
    }

    #[test]
    fn single_blink_is_symmetric_around_the_closed_phase() {
        let frames = single_blink(0.5, 24, 0.0);
        // round(0.5*24)=12 -> half=3, closed=4.
        let states: Vec<EyeState> = frames.iter().map(|f| f.state).collect();
        let half_leading = states
            .iter()
            .take_while(|s| **s == EyeState::Half)
            .count();
        let half_trailing = states[..states.len() - 1]
            .iter()
            .rev()
            .take_while(|s| **s == EyeState::Half)
            .count();
        assert_eq!(half_leading, 3);
        assert_eq!(half_trailing, 3);
        assert_eq!(frames.len(), 3 + 4 + 3 + 1);
    }

    #[test]
    fn closed_hold_extends_the_closed_phase() {
        let base = single_blink(0.2, 20, 0.0);
        let held = single_blink(0.2, 20, 0.5);
        // round(0.5*20) = 10 extra closed frames.
        assert_eq!(held.len(), base.len() + 10);
        assert!((total_ms(&held) - total_ms(&base) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn expand_step_places_interval_between_blinks_only() {
        let pattern = pattern_of(&[StepSpec {
            blink_count: 3,
            blink_speed: 0.2,
            blink_interval: 0.5,
            pause_duration: 1.0,
            closed_hold: 0.4,
        }]);
        let step = &pattern.steps()[0];
        let fps = 10;
        let frames = expand_step(step, fps);

        let one_blink = single_blink(0.2, fps, 0.0).len();
        let final_blink = single_blink(0.2, fps, 0.4).len();
        let interval = (0.5 * fps as f64).round() as usize;
        let pause = (1.0 * fps as f64).round() as usize;
        // Two plain blinks, two intervals, one held blink, one pause.
        assert_eq!(
            frames.len(),
            2 * one_blink + 2 * interval + final_blink + pause
        );
    }

    #[test]
    fn pattern_frames_covers_requested_length_nominally() {
        // Scenario: one neutral step (3.15s nominal) at 24fps over 10s.
        let pattern = pattern_of(&[neutral_spec()]);
        let settings = BlinkSettings {
            fps: 24,
            animation_length: 10.0,
        };
        let frames = pattern_frames(&pattern, &settings);

        let per_phrase = expand_step(&pattern.steps()[0], 24).len();
        // Three phrases reach 9.45s nominal, so a fourth is appended.
        assert_eq!(frames.len(), 4 * per_phrase);
        assert!(4.0 * pattern.steps()[0].nominal_duration() >= 10.0);
    }

    #[test]
    fn pattern_frames_breaks_mid_pattern() {
        let long = StepSpec {
            blink_count: 1,
            blink_speed: 0.2,
            blink_interval: 0.2,
            pause_duration: 6.0,
            closed_hold: 0.0,
        };
        let pattern = pattern_of(&[long, neutral_spec()]);
        let settings = BlinkSettings {
            fps: 12,
            animation_length: 5.0,
        };
        // The first step alone (6.2s nominal) covers 5s; the second step
        // never runs.
        let frames = pattern_frames(&pattern, &settings);
        assert_eq!(frames.len(), expand_step(&pattern.steps()[0], 12).len());
    }

    #[test]
    fn pattern_frames_is_deterministic() {
        let pattern = pattern_of(&[neutral_spec()]);
        let settings = BlinkSettings {
            fps: 24,
            animation_length: 10.0,
        };
        assert_eq!(
            pattern_frames(&pattern, &settings),
            pattern_frames(&pattern, &settings)
        );
    }

    #[test]
    fn pattern_frames_zero_length_is_empty_not_an_error() {
        let pattern = pattern_of(&[neutral_spec()]);
        let settings = BlinkSettings {
            fps: 24,
            animation_length: 0.0,
        };
        assert!(pattern_frames(&pattern, &settings).is_empty());
    }

    #[test]
    fn reducer_preserves_duration_and_halves_count() {
        for len in [1usize, 2, 3, 10, 11, 79] {
            let frames: Vec<Frame> = (0..len)
                .map(|i| Frame {
                    state: if i % 2 == 0 {
                        EyeState::Open
                    } else {
                        EyeState::Closed
                    },
                    duration_ms: 1000.0 / 24.0,
                })
                .collect();
            let reduced = reduce_frame_density(&frames);
            assert_eq!(reduced.len(), len.div_ceil(2));
            assert!((total_ms(&reduced) - total_ms(&frames)).abs() < 1e-9);
        }
    }

    #[test]
    fn reducer_keeps_the_first_state_of_each_pair() {
        let frames = vec![
            Frame {
                state: EyeState::Half,
                duration_ms: 10.0,
            },
            Frame {
                state: EyeState::Closed,
                duration_ms: 20.0,
            },
            Frame {
                state: EyeState::Open,
                duration_ms: 30.0,
            },
        ];
        let reduced = reduce_frame_density(&frames);
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].state, EyeState::Half);
        assert_eq!(reduced[0].duration_ms, 30.0);
        assert_eq!(reduced[1].state, EyeState::Open);
        assert_eq!(reduced[1].duration_ms, 30.0);
    }
}
