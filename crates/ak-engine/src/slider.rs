//! Linear per-frame interpolation of a channel property.

/// Values a [`Slider`] can interpolate.
pub trait Lerp: Copy {
    /// Value `num/den` of the way from `from` to `to`.
    fn lerp(from: Self, to: Self, num: u32, den: u32) -> Self;
}

impl Lerp for i32 {
    fn lerp(from: i32, to: i32, num: u32, den: u32) -> i32 {
        from + ((to - from) as i64 * num as i64 / den as i64) as i32
    }
}

impl Lerp for f32 {
    fn lerp(from: f32, to: f32, num: u32, den: u32) -> f32 {
        from + (to - from) * num as f32 / den as f32
    }
}

/// Slide from a captured start value to a target over a fixed frame count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slider<T> {
    from: T,
    to: T,
    elapsed: u32,
    total: u32,
}

impl<T: Lerp> Slider<T> {
    /// A slide lasting `frames` frames (at least one).
    pub fn new(from: T, to: T, frames: u32) -> Self {
        Self {
            from,
            to,
            elapsed: 0,
            total: frames.max(1),
        }
    }

    pub fn target(&self) -> T {
        self.to
    }

    /// Advance one frame. Returns the new value and whether the slide ended,
    /// in which case the value is exactly the target.
    pub fn step(&mut self) -> (T, bool) {
        self.elapsed += 1;
        if self.elapsed >= self.total {
            (self.to, true)
        } else {
            (T::lerp(self.from, self.to, self.elapsed, self.total), false)
        }
    }
}
