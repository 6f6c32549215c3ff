//! Q16.16 fixed-point arithmetic.
//!
//! Every outcome-affecting quantity in the simulation is an `Fp`: a 32-bit
//! signed integer with 16 fractional bits. Floating point never enters the
//! tick path, so a client and the verifying server produce identical bits
//! regardless of platform.
//!
//! Truncation contract: each operation widens to `i64` internally where
//! needed and truncates back to `i32` before returning. No intermediate is
//! ever stored at a wider precision. Effective safe range for `mul` is about
//! ±32767.

/// Q16.16 fixed-point value.
pub type Fp = i32;

/// Number of fractional bits.
pub const FRAC_BITS: u32 = 16;

/// 1.0
pub const ONE: Fp = 1 << FRAC_BITS;

/// 0.5
pub const HALF: Fp = ONE >> 1;

/// Largest representable value.
pub const MAX: Fp = i32::MAX;

/// Smallest representable value.
pub const MIN: Fp = i32::MIN;

const FRAC_MASK: i32 = ONE - 1;

// ============================================================================
// Conversions
// ============================================================================

/// Convert an integer to fixed-point (wrapping outside ±32767).
#[inline]
pub const fn from_int(v: i32) -> Fp {
    v.wrapping_shl(FRAC_BITS)
}

/// Build `num / den` as fixed-point. `den == 0` follows `div` semantics.
#[inline]
pub const fn from_ratio(num: i32, den: i32) -> Fp {
    if den == 0 {
        return if num >= 0 { MAX } else { MIN };
    }
    (((num as i64) << FRAC_BITS) / den as i64) as i32
}

/// Build a value from hundredths, e.g. `from_pct(15)` is 0.15.
#[inline]
pub const fn from_pct(pct: i32) -> Fp {
    from_ratio(pct, 100)
}

/// Integer part, rounded toward negative infinity.
#[inline]
pub const fn to_int(v: Fp) -> i32 {
    v >> FRAC_BITS
}

// ============================================================================
// Arithmetic
// ============================================================================

/// Wrapping addition.
#[inline]
pub const fn add(a: Fp, b: Fp) -> Fp {
    a.wrapping_add(b)
}

/// Wrapping subtraction.
#[inline]
pub const fn sub(a: Fp, b: Fp) -> Fp {
    a.wrapping_sub(b)
}

/// Multiply: `(a * b) >> 16` in 64 bits, truncated to 32 bits.
#[inline]
pub const fn mul(a: Fp, b: Fp) -> Fp {
    ((a as i64 * b as i64) >> FRAC_BITS) as i32
}

/// Divide: `(a << 16) / b` in 64 bits, truncated to 32 bits.
///
/// Division by zero never panics: it yields `MAX` for a non-negative
/// dividend and `MIN` for a negative one.
#[inline]
pub const fn div(a: Fp, b: Fp) -> Fp {
    if b == 0 {
        return if a >= 0 { MAX } else { MIN };
    }
    (((a as i64) << FRAC_BITS) / b as i64) as i32
}

/// Multiply a fixed-point value by a plain integer.
#[inline]
pub const fn mul_int(a: Fp, n: i32) -> Fp {
    a.wrapping_mul(n)
}

/// Integer square root of a `u64` (largest `r` with `r*r <= n`).
pub const fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    // Bit-guess: build the root one bit at a time from the top.
    let mut result: u64 = 0;
    let mut bit: u64 = 1 << 62;
    let mut rem = n;
    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= result + bit {
            rem -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result
}

/// Square root of a fixed-point value.
///
/// Newton iteration on the raw integer, then scaled by `2^8` to land back in
/// Q16.16. Non-positive input yields 0.
pub const fn sqrt(v: Fp) -> Fp {
    if v <= 0 {
        return 0;
    }
    let n = v as i64;
    let mut x = n;
    let mut y = (x + 1) >> 1;
    while y < x {
        x = y;
        y = (x + n / x) >> 1;
    }
    (x << 8) as i32
}

/// Round toward negative infinity.
#[inline]
pub const fn floor(v: Fp) -> Fp {
    v & !FRAC_MASK
}

/// Round toward positive infinity.
#[inline]
pub const fn ceil(v: Fp) -> Fp {
    floor(v.wrapping_add(FRAC_MASK))
}

/// Round half up (0.5 goes to 1, -0.5 goes to 0).
#[inline]
pub const fn round(v: Fp) -> Fp {
    floor(v.wrapping_add(HALF))
}

#[inline]
pub const fn abs(v: Fp) -> Fp {
    v.wrapping_abs()
}

#[inline]
pub const fn min(a: Fp, b: Fp) -> Fp {
    if a < b { a } else { b }
}

#[inline]
pub const fn max(a: Fp, b: Fp) -> Fp {
    if a > b { a } else { b }
}

/// Clamp `v` into `[lo, hi]`.
#[inline]
pub const fn clamp(v: Fp, lo: Fp, hi: Fp) -> Fp {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

/// Linear interpolation `a + (b - a) * t`.
#[inline]
pub const fn lerp(a: Fp, b: Fp, t: Fp) -> Fp {
    add(a, mul(sub(b, a), t))
}

/// Squared distance between two points, for range comparisons without sqrt.
#[inline]
pub const fn dist_sq(ax: Fp, ay: Fp, bx: Fp, by: Fp) -> Fp {
    let dx = sub(ax, bx);
    let dy = sub(ay, by);
    add(mul(dx, dx), mul(dy, dy))
}

// ============================================================================
// FpVec2
// ============================================================================

/// 2D vector in fixed-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FpVec2 {
    pub x: Fp,
    pub y: Fp,
}

impl FpVec2 {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: Fp, y: Fp) -> Self {
        Self { x, y }
    }

    pub const fn add(self, other: Self) -> Self {
        Self::new(add(self.x, other.x), add(self.y, other.y))
    }

    pub const fn sub(self, other: Self) -> Self {
        Self::new(sub(self.x, other.x), sub(self.y, other.y))
    }

    pub const fn scale(self, s: Fp) -> Self {
        Self::new(mul(self.x, s), mul(self.y, s))
    }

    pub const fn length_sq(self) -> Fp {
        add(mul(self.x, self.x), mul(self.y, self.y))
    }

    pub const fn length(self) -> Fp {
        sqrt(self.length_sq())
    }

    pub const fn dist_sq(self, other: Self) -> Fp {
        dist_sq(self.x, self.y, other.x, other.y)
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub const fn normalize(self) -> Self {
        let len = self.length();
        if len == 0 {
            return Self::ZERO;
        }
        Self::new(div(self.x, len), div(self.y, len))
    }
}

// ============================================================================
// Tests
// ============================================================================
