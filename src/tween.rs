use glam::Vec3;

/// Quadratic ease-out, `power1.out` in GSAP terms.
pub fn power1_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

/// One interpolation from `from` to `to`, timed against host milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    pub from: Vec3,
    pub to: Vec3,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl Tween {
    pub fn progress(&self, now_ms: f64) -> f32 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0) as f32
    }

    pub fn sample(&self, now_ms: f64) -> Vec3 {
        self.from.lerp(self.to, power1_out(self.progress(now_ms)))
    }

    pub fn is_complete(&self, now_ms: f64) -> bool {
        self.progress(now_ms) >= 1.0
    }
}

/// A position driven by at most one in-flight tween.
///
/// Retargeting replaces the running tween, starting from wherever the old one
/// had got to, so rapid pointer input never stacks interpolations.
#[derive(Clone, Debug)]
pub struct PositionTween {
    value: Vec3,
    active: Option<Tween>,
    duration_ms: f64,
}

impl PositionTween {
    pub fn new(initial: Vec3, duration_secs: f32) -> Self {
        Self {
            value: initial,
            active: None,
            duration_ms: f64::from(duration_secs) * 1000.0,
        }
    }

    pub fn value_at(&self, now_ms: f64) -> Vec3 {
        match &self.active {
            Some(tween) => tween.sample(now_ms),
            None => self.value,
        }
    }

    pub fn retarget(&mut self, target: Vec3, now_ms: f64) {
        let from = self.value_at(now_ms);
        self.value = from;
        self.active = Some(Tween {
            from,
            to: target,
            start_ms: now_ms,
            duration_ms: self.duration_ms,
        });
    }

    /// Advances to `now_ms` and returns the current value.
    pub fn advance(&mut self, now_ms: f64) -> Vec3 {
        if let Some(tween) = self.active {
            self.value = tween.sample(now_ms);
            if tween.is_complete(now_ms) {
                self.value = tween.to;
                self.active = None;
            }
        }
        self.value
    }

    pub fn value(&self) -> Vec3 {
        self.value
    }

    pub fn target(&self) -> Option<Vec3> {
        self.active.map(|tween| tween.to)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}
