use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeKind {
    In,
    Out,
}

/// Linear volume ramp advanced one tick at a time.
///
/// Every step stays within `[0, 1]` and moves monotonically from `from`
/// towards `to`; the last step lands exactly on `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fade {
    pub id: u64,
    pub kind: FadeKind,
    from: f32,
    to: f32,
    steps: u32,
    step: u32,
}

impl Fade {
    pub fn new(
        id: u64,
        kind: FadeKind,
        from: f32,
        to: f32,
        duration: Duration,
        tick: Duration,
    ) -> Self {
        let steps = if tick.is_zero() {
            1
        } else {
            (duration.as_secs_f64() / tick.as_secs_f64()).round().max(1.0) as u32
        };
        Self {
            id,
            kind,
            from: from.clamp(0.0, 1.0),
            to: to.clamp(0.0, 1.0),
            steps,
            step: 0,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn is_done(&self) -> bool {
        self.step >= self.steps
    }

    pub fn volume(&self) -> f32 {
        if self.is_done() {
            return self.to;
        }
        let progress = self.step as f32 / self.steps as f32;
        (self.from + (self.to - self.from) * progress).clamp(0.0, 1.0)
    }

    /// Move one step and return the new volume.
    pub fn advance(&mut self) -> f32 {
        if self.step < self.steps {
            self.step += 1;
        }
        self.volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(kind: FadeKind, from: f32, to: f32, duration_ms: u64) -> Fade {
        Fade::new(
            1,
            kind,
            from,
            to,
            Duration::from_millis(duration_ms),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn default_fade_in_has_forty_steps() {
        let fade = ramp(FadeKind::In, 0.0, 0.8, 2000);
        assert_eq!(fade.steps(), 40);
    }

    #[test]
    fn ramp_is_monotonic_and_exact_at_the_end() {
        let mut fade = ramp(FadeKind::In, 0.0, 0.8, 2000);
        let mut last = fade.volume();
        while !fade.is_done() {
            let v = fade.advance();
            assert!(v >= last);
            assert!((0.0..=1.0).contains(&v));
            last = v;
        }
        assert_eq!(last, 0.8);
        assert_eq!(fade.advance(), 0.8);
    }

    #[test]
    fn fade_out_reaches_zero() {
        let mut fade = ramp(FadeKind::Out, 0.6, 0.0, 1000);
        let first = fade.advance();
        assert_relative_eq!(first, 0.57, epsilon = 1e-5);
        let mut last = first;
        while !fade.is_done() {
            let v = fade.advance();
            assert!(v <= last);
            last = v;
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        let mut fade = ramp(FadeKind::In, -1.0, 4.0, 100);
        assert_eq!(fade.volume(), 0.0);
        fade.advance();
        assert_eq!(fade.advance(), 1.0);
    }

    #[test]
    fn short_fade_takes_one_step() {
        let mut fade = ramp(FadeKind::Out, 0.5, 0.0, 0);
        assert_eq!(fade.steps(), 1);
        assert_eq!(fade.advance(), 0.0);
        assert!(fade.is_done());
    }
}
