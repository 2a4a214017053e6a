use crate::error::AnimationError;

/// Ping-pong playback position over a sequence of key frames.
///
/// Segment `current` blends key frame `current` into `current + 1`, so the
/// cursor only ever sits on segments `0..frame_count - 1`. Each segment lasts
/// the time span of its first key frame.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeCursor {
    spans: Vec<f32>,
    current: usize,
    time: f32,
    forwards: bool,
    looping: bool,
}

impl KeyframeCursor {
    /// Starts at the beginning of segment 0, playing forwards with looping on.
    pub fn new(spans: Vec<f32>) -> Result<Self, AnimationError> {
        if spans.len() < 2 {
            return Err(AnimationError::TooFewKeyFrames(spans.len()));
        }
        if let Some((index, &value)) = spans
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s <= 0.0)
        {
            return Err(AnimationError::InvalidTimeSpan { index, value });
        }

        Ok(Self {
            spans,
            current: 0,
            time: 0.0,
            forwards: true,
            looping: true,
        })
    }

    /// Advances by `dt` seconds.
    ///
    /// Playing forwards past the last segment either turns around (looping)
    /// or holds on the final pose. Playing backwards past segment 0 always
    /// turns forwards again. Overshoot within a step is discarded.
    pub fn advance(&mut self, dt: f32) {
        let last_segment = self.spans.len() - 2;

        if self.forwards {
            self.time += dt;
            if self.time > self.spans[self.current] {
                if self.current < last_segment {
                    self.time = 0.0;
                    self.current += 1;
                } else {
                    if self.looping {
                        self.forwards = false;
                    }
                    self.time = self.spans[self.current];
                }
            }
        } else {
            self.time -= dt;
            if self.time < 0.0 {
                if self.current > 0 {
                    self.current -= 1;
                    self.time = self.spans[self.current];
                } else {
                    self.forwards = true;
                    self.time = 0.0;
                }
            }
        }
    }

    /// Blend factor from key frame `current` to `current + 1`, in `[0, 1]`.
    pub fn blend(&self) -> f32 {
        (self.time / self.spans[self.current]).clamp(0.0, 1.0)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn next(&self) -> usize {
        self.current + 1
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_forwards(&self) -> bool {
        self.forwards
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Turning looping off mid-reverse lets the cursor finish the way back first.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn frame_count(&self) -> usize {
        self.spans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(spans: &[f32]) -> KeyframeCursor {
        KeyframeCursor::new(spans.to_vec()).unwrap()
    }

    // ── validation ────────────────────────────────────────────────────────

    #[test]
    fn needs_two_frames() {
        assert_eq!(
            KeyframeCursor::new(vec![1.0]),
            Err(AnimationError::TooFewKeyFrames(1))
        );
    }

    #[test]
    fn rejects_bad_spans() {
        assert_eq!(
            KeyframeCursor::new(vec![1.0, 0.0]),
            Err(AnimationError::InvalidTimeSpan {
                index: 1,
                value: 0.0
            })
        );
        assert!(KeyframeCursor::new(vec![f32::NAN, 1.0]).is_err());
        assert!(KeyframeCursor::new(vec![1.0, -2.0, 1.0]).is_err());
    }

    // ── playback ──────────────────────────────────────────────────────────

    #[test]
    fn blend_tracks_time_within_segment() {
        let mut c = cursor(&[2.0, 2.0, 2.0]);
        c.advance(0.5);
        assert_eq!(c.current(), 0);
        assert!((c.blend() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn moves_to_next_segment_and_resets_time() {
        let mut c = cursor(&[1.0, 1.0, 1.0]);
        c.advance(1.5);
        assert_eq!(c.current(), 1);
        assert_eq!(c.time(), 0.0);
        assert_eq!(c.next(), 2);
    }

    #[test]
    fn turns_around_at_last_segment_when_looping() {
        let mut c = cursor(&[1.0, 1.0, 1.0]);
        c.advance(1.5);
        c.advance(1.5);

        assert_eq!(c.current(), 1);
        assert!(!c.is_forwards());
        assert_eq!(c.blend(), 1.0);

        c.advance(0.25);
        assert!((c.blend() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn walks_back_to_first_segment_and_turns_forwards() {
        let mut c = cursor(&[1.0, 1.0, 1.0]);
        c.advance(1.5);
        c.advance(1.5);

        c.advance(1.5);
        assert_eq!(c.current(), 0);
        assert_eq!(c.blend(), 1.0);

        c.advance(1.5);
        assert_eq!(c.current(), 0);
        assert!(c.is_forwards());
        assert_eq!(c.time(), 0.0);
    }

    #[test]
    fn holds_final_pose_without_looping() {
        let mut c = cursor(&[1.0, 1.0]);
        c.set_looping(false);
        for _ in 0..10 {
            c.advance(0.4);
        }
        assert_eq!(c.current(), 0);
        assert!(c.is_forwards());
        assert_eq!(c.blend(), 1.0);
    }

    #[test]
    fn cursor_never_leaves_valid_segments() {
        let mut c = cursor(&[0.3, 0.7, 0.2, 0.5]);
        for step in 0..500 {
            c.advance(0.05 + (step % 7) as f32 * 0.03);
            assert!(c.next() < c.frame_count());
            assert!((0.0..=1.0).contains(&c.blend()));
        }
    }
}
