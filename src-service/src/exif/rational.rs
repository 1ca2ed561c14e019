//! Rational approximations and degree/minute/second conversion.

/// Tolerance of the continued-fraction expansion.
const FRACTION_EPSILON: f64 = 1.0e-6;

/// Upper bound on expansion steps; real inputs converge in far fewer.
const MAX_FRACTION_TERMS: usize = 32;

/// A signed EXIF rational (SRATIONAL layout, two 32-bit integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

/// Continued-fraction approximation of `x`.
///
/// Expansion stops once the remainder is within `1e-6 * k^2`, where `k` is
/// the current denominator.
pub fn fraction(x: f64) -> (i64, i64) {
    let mut x = x;
    let mut a = x.floor();
    let (mut h1, mut k1, mut h, mut k) = (1i64, 0i64, a as i64, 1i64);

    for _ in 0..MAX_FRACTION_TERMS {
        if x - a <= FRACTION_EPSILON * (k as f64) * (k as f64) {
            break;
        }
        x = 1.0 / (x - a);
        a = x.floor();
        let step = a as i64;
        let (Some(next_h), Some(next_k)) = (
            step.checked_mul(h).and_then(|v| v.checked_add(h1)),
            step.checked_mul(k).and_then(|v| v.checked_add(k1)),
        ) else {
            break;
        };
        (h1, k1, h, k) = (h, k, next_h, next_k);
    }
    (h, k)
}

/// Fraction clamped into an EXIF rational.
pub fn to_rational(x: f64) -> Rational {
    let (num, den) = fraction(x);
    match (i32::try_from(num), i32::try_from(den)) {
        (Ok(num), Ok(den)) => Rational::new(num, den),
        _ => Rational::new((x * 1000.0).round() as i32, 1000),
    }
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let multiplier = 10f64.powi(places);
    (value * multiplier).round() / multiplier
}

/// `num/den` string of `value` rounded to 5 places, as written to XMP tags.
pub fn fraction_string(value: f64) -> String {
    let (num, den) = fraction(round_to(value, 5));
    format!("{}/{}", num, den)
}

/// Degrees, minutes and seconds as three EXIF rationals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dms {
    pub degrees: Rational,
    pub minutes: Rational,
    pub seconds: Rational,
}

impl Dms {
    /// Split decimal degrees into whole degrees, whole minutes and fractional seconds.
    pub fn from_degrees(value: f64) -> Self {
        let degrees = value.trunc();
        let minutes = ((value - degrees) * 60.0).trunc();
        let seconds = ((value - degrees) * 60.0 - minutes) * 60.0;
        Self {
            degrees: Rational::new(degrees as i32, 1),
            minutes: Rational::new(minutes as i32, 1),
            seconds: to_rational(seconds),
        }
    }

    pub fn to_degrees(&self) -> f64 {
        self.degrees.to_f64() + self.minutes.to_f64() / 60.0 + self.seconds.to_f64() / 3600.0
    }
}

/// Shorthand for [`Dms::from_degrees`].
pub fn degrees_to_rational(value: f64) -> Dms {
    Dms::from_degrees(value)
}
