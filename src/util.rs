use nalgebra::{point, vector, Vector3};
use std::cmp::Ordering;

#[inline(always)]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

#[inline(always)]
pub fn lerp_vec(a: Vector3<f32>, b: Vector3<f32>, t: f32) -> Vector3<f32> {
    vector![lerp(a.x, b.x, t), lerp(a.y, b.y, t), lerp(a.z, b.z, t)]
}

/// Version of `min` that only requires `PartialOrd`
#[inline(always)]
pub fn min<S: PartialOrd + Copy>(lhs: S, rhs: S) -> S {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Less) | Some(Ordering::Equal) | None => lhs,
        _ => rhs,
    }
}

/// Version of `max` that only requires `PartialOrd`
#[inline(always)]
pub fn max<S: PartialOrd + Copy>(lhs: S, rhs: S) -> S {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Greater) | Some(Ordering::Equal) | None => lhs,
        _ => rhs,
    }
}

/// Limits the range of `x` to be within `[a, b]`
#[inline(always)]
pub fn clamp<T: PartialOrd + Copy>(x: T, a: T, b: T) -> T {
    if x < a {
        a
    } else if x > b {
        b
    } else {
        x
    }
}

#[inline(always)]
pub fn is_within<T: PartialOrd + Copy>(t: T, min: T, max: T) -> bool {
    t >= min && t <= max
}

#[inline(always)]
pub fn is_between<T: PartialOrd + Copy>(t: T, min: T, max: T) -> bool {
    t > min && t < max
}

/// x / y, round towards negative inf
#[inline(always)]
pub fn floor_div(x: i32, y: i32) -> i32 {
    let result = x / y;
    let remainder = x % y;
    if remainder < 0 {
        result - 1
    } else {
        result
    }
}

/// x mod y, round towards negative inf (the remainder of `floor_div`)
#[inline(always)]
pub fn floor_mod(x: i32, y: i32) -> i32 {
    let result = x % y;
    if result < 0 {
        result + y
    } else {
        result
    }
}

/// Mathematical mod function
#[inline(always)]
pub fn modulo(a: f32, b: f32) -> f32 {
    (a % b + b) % b
}

pub struct Defer<F: FnOnce()>(pub Option<F>);
impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        (self.0.take().unwrap())();
    }
}

#[macro_export]
macro_rules! defer {
    ($($code:tt)*) => {
        let _defer = $crate::util::Defer(Some(|| drop({ $($code)* })));
    };
}

pub use defer;

/// A sender/receiver pair sharing a single unbounded channel. Used for the
/// working set's `load_queue`, `rebuild_set`, and `swap_queue`, each of which
/// needs a sender the foreground can clone and hand to itself while the
/// worker holds the receiver (or vice versa).
pub struct ChannelPair<T> {
    pub rx: crossbeam_channel::Receiver<T>,
    pub tx: crossbeam_channel::Sender<T>,
}

impl<T> ChannelPair<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { rx, tx }
    }

    pub fn sender(&self) -> crossbeam_channel::Sender<T> {
        self.tx.clone()
    }
}

impl<T> Default for ChannelPair<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_div_rounds_towards_negative_infinity() {
        assert_eq!(floor_div(5, 2), 2);
        assert_eq!(floor_div(-5, 2), -3);
        assert_eq!(floor_div(-1, 32), -1);
        assert_eq!(floor_div(31, 32), 0);
        assert_eq!(floor_div(32, 32), 1);
    }

    #[test]
    fn floor_mod_is_always_nonnegative() {
        assert_eq!(floor_mod(5, 2), 1);
        assert_eq!(floor_mod(-5, 2), 1);
        assert_eq!(floor_mod(-1, 32), 31);
    }

    #[test]
    fn channel_pair_round_trips() {
        let pair = ChannelPair::new();
        let tx = pair.sender();
        tx.send(42).unwrap();
        assert_eq!(pair.rx.recv().unwrap(), 42);
    }
}
