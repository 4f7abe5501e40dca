// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Wrap-safe arithmetic on the free-running 32-bit microsecond timer.
//!
//! The timer rolls over every ~71.6 minutes. Deadlines are compared through the signed
//! difference, so any two instants less than 2^31 µs apart order correctly across a wrap.

/// True once `now_us` has reached `deadline_us`.
#[inline]
pub fn is_due(now_us: u32, deadline_us: u32) -> bool {
    (now_us.wrapping_sub(deadline_us) as i32) >= 0
}

/// Microseconds from `since_us` to `now_us`.
#[inline]
pub fn elapsed(now_us: u32, since_us: u32) -> u32 {
    now_us.wrapping_sub(since_us)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_across_wrap() {
        let deadline = u32::MAX - 10;
        assert!(!is_due(u32::MAX - 11, deadline));
        assert!(is_due(deadline, deadline));
        assert!(is_due(5, deadline));
        assert_eq!(elapsed(5, deadline), 16);
    }
}
