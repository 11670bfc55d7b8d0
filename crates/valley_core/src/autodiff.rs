use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// Seeds `x` as the active variable (eps = 1).
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    fn real(self) -> f64 {
        self.val
    }

    fn is_constant(self) -> bool {
        self.eps == 0.0
    }

    fn set_real(&mut self, val: f64) {
        self.val = val;
    }

    /// Applies a scalar function g with g(val) = f0 and g'(val) = f1.
    fn chain(self, f0: f64, f1: f64, _f2: f64) -> Self {
        Self::new(f0, f1 * self.eps)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

/// Second-order forward-mode number.
///
/// Carries f, the two directional derivatives along the seeded directions
/// `e1` and `e2`, and the mixed second derivative `e12`. Seeding x_i with
/// e1 = 1 and x_j with e2 = 1 yields d2f/dx_i dx_j in `e12` of the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperDual {
    pub val: f64,
    pub e1: f64,
    pub e2: f64,
    pub e12: f64,
}

impl HyperDual {
    pub fn new(val: f64, e1: f64, e2: f64, e12: f64) -> Self {
        Self { val, e1, e2, e12 }
    }

    fn constant(val: f64) -> Self {
        Self::new(val, 0.0, 0.0, 0.0)
    }

    fn real(self) -> f64 {
        self.val
    }

    fn is_constant(self) -> bool {
        self.e1 == 0.0 && self.e2 == 0.0 && self.e12 == 0.0
    }

    fn set_real(&mut self, val: f64) {
        self.val = val;
    }

    /// Applies a scalar function g with g(val) = f0, g'(val) = f1, g''(val) = f2.
    fn chain(self, f0: f64, f1: f64, f2: f64) -> Self {
        Self::new(
            f0,
            f1 * self.e1,
            f1 * self.e2,
            f1 * self.e12 + f2 * self.e1 * self.e2,
        )
    }
}

impl Add for HyperDual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.val + rhs.val,
            self.e1 + rhs.e1,
            self.e2 + rhs.e2,
            self.e12 + rhs.e12,
        )
    }
}

impl Sub for HyperDual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.val - rhs.val,
            self.e1 - rhs.e1,
            self.e2 - rhs.e2,
            self.e12 - rhs.e12,
        )
    }
}

impl Mul for HyperDual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.val * rhs.val,
            self.val * rhs.e1 + self.e1 * rhs.val,
            self.val * rhs.e2 + self.e2 * rhs.val,
            self.val * rhs.e12 + self.e12 * rhs.val + self.e1 * rhs.e2 + self.e2 * rhs.e1,
        )
    }
}

impl Div for HyperDual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self * rhs.recip()
    }
}

impl Neg for HyperDual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.e1, -self.e2, -self.e12)
    }
}

// The remaining numeric traits only depend on `real`, `constant` and `chain`,
// so both dual types share one implementation.
macro_rules! impl_dual_numeric {
    ($t:ty) => {
        impl PartialOrd for $t {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                self.real().partial_cmp(&other.real())
            }
        }

        impl Zero for $t {
            fn zero() -> Self {
                <$t>::constant(0.0)
            }
            fn is_zero(&self) -> bool {
                *self == <$t>::constant(0.0)
            }
        }

        impl One for $t {
            fn one() -> Self {
                <$t>::constant(1.0)
            }
        }

        impl Rem for $t {
            type Output = Self;
            fn rem(self, rhs: Self) -> Self {
                // d/dx (x mod c) = 1 away from the discontinuities.
                self.chain(self.real() % rhs.real(), 1.0, 0.0)
            }
        }

        impl AddAssign for $t {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }
        impl SubAssign for $t {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }
        impl MulAssign for $t {
            fn mul_assign(&mut self, rhs: Self) {
                *self = *self * rhs;
            }
        }
        impl DivAssign for $t {
            fn div_assign(&mut self, rhs: Self) {
                *self = *self / rhs;
            }
        }
        impl RemAssign for $t {
            fn rem_assign(&mut self, rhs: Self) {
                *self = *self % rhs;
            }
        }

        impl Num for $t {
            type FromStrRadixErr = ();
            fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
                f64::from_str_radix(str, radix)
                    .map(<$t>::constant)
                    .map_err(|_| ())
            }
        }

        impl ToPrimitive for $t {
            fn to_i64(&self) -> Option<i64> {
                self.real().to_i64()
            }
            fn to_u64(&self) -> Option<u64> {
                self.real().to_u64()
            }
            fn to_f64(&self) -> Option<f64> {
                Some(self.real())
            }
        }

        impl FromPrimitive for $t {
            fn from_i64(n: i64) -> Option<Self> {
                Some(<$t>::constant(n as f64))
            }
            fn from_u64(n: u64) -> Option<Self> {
                Some(<$t>::constant(n as f64))
            }
            fn from_f64(n: f64) -> Option<Self> {
                Some(<$t>::constant(n))
            }
        }

        impl NumCast for $t {
            fn from<T: ToPrimitive>(n: T) -> Option<Self> {
                n.to_f64().map(<$t>::constant)
            }
        }

        impl Float for $t {
            fn nan() -> Self {
                <$t>::constant(f64::NAN)
            }
            fn infinity() -> Self {
                <$t>::constant(f64::INFINITY)
            }
            fn neg_infinity() -> Self {
                <$t>::constant(f64::NEG_INFINITY)
            }
            fn neg_zero() -> Self {
                <$t>::constant(-0.0)
            }
            fn min_value() -> Self {
                <$t>::constant(f64::MIN)
            }
            fn min_positive_value() -> Self {
                <$t>::constant(f64::MIN_POSITIVE)
            }
            fn max_value() -> Self {
                <$t>::constant(f64::MAX)
            }
            fn is_nan(self) -> bool {
                self.real().is_nan()
            }
            fn is_infinite(self) -> bool {
                self.real().is_infinite()
            }
            fn is_finite(self) -> bool {
                self.real().is_finite()
            }
            fn is_normal(self) -> bool {
                self.real().is_normal()
            }
            fn classify(self) -> std::num::FpCategory {
                self.real().classify()
            }
            fn floor(self) -> Self {
                <$t>::constant(self.real().floor())
            }
            fn ceil(self) -> Self {
                <$t>::constant(self.real().ceil())
            }
            fn round(self) -> Self {
                <$t>::constant(self.real().round())
            }
            fn trunc(self) -> Self {
                <$t>::constant(self.real().trunc())
            }
            fn fract(self) -> Self {
                self.chain(self.real().fract(), 1.0, 0.0)
            }
            fn abs(self) -> Self {
                if self.real() >= 0.0 {
                    self
                } else {
                    -self
                }
            }
            fn signum(self) -> Self {
                <$t>::constant(self.real().signum())
            }
            fn is_sign_positive(self) -> bool {
                self.real().is_sign_positive()
            }
            fn is_sign_negative(self) -> bool {
                self.real().is_sign_negative()
            }
            fn mul_add(self, a: Self, b: Self) -> Self {
                self * a + b
            }
            fn recip(self) -> Self {
                let v = self.real();
                self.chain(1.0 / v, -1.0 / (v * v), 2.0 / (v * v * v))
            }
            fn powi(self, n: i32) -> Self {
                let v = self.real();
                let nf = n as f64;
                let f1 = if n == 0 { 0.0 } else { nf * v.powi(n - 1) };
                let f2 = if n == 0 || n == 1 {
                    0.0
                } else {
                    nf * (nf - 1.0) * v.powi(n - 2)
                };
                self.chain(v.powi(n), f1, f2)
            }
            fn powf(self, n: Self) -> Self {
                if n.is_constant() {
                    // Power rule keeps negative bases with integral exponents finite.
                    let v = self.real();
                    let p = n.real();
                    if p == 0.0 {
                        return <$t>::constant(1.0);
                    }
                    let f2 = if p == 1.0 {
                        0.0
                    } else {
                        p * (p - 1.0) * v.powf(p - 2.0)
                    };
                    return self.chain(v.powf(p), p * v.powf(p - 1.0), f2);
                }
                let mut result = (self.ln() * n).exp();
                result.set_real(self.real().powf(n.real()));
                result
            }
            fn sqrt(self) -> Self {
                let v = self.real();
                let s = v.sqrt();
                self.chain(s, 0.5 / s, -0.25 / (s * v))
            }
            fn exp(self) -> Self {
                let e = self.real().exp();
                self.chain(e, e, e)
            }
            fn exp2(self) -> Self {
                let e = self.real().exp2();
                let ln2 = std::f64::consts::LN_2;
                self.chain(e, ln2 * e, ln2 * ln2 * e)
            }
            fn ln(self) -> Self {
                let v = self.real();
                self.chain(v.ln(), 1.0 / v, -1.0 / (v * v))
            }
            fn log(self, base: Self) -> Self {
                self.ln() / base.ln()
            }
            fn log2(self) -> Self {
                let v = self.real();
                let ln2 = std::f64::consts::LN_2;
                self.chain(v.log2(), 1.0 / (v * ln2), -1.0 / (v * v * ln2))
            }
            fn log10(self) -> Self {
                let v = self.real();
                let ln10 = std::f64::consts::LN_10;
                self.chain(v.log10(), 1.0 / (v * ln10), -1.0 / (v * v * ln10))
            }
            fn max(self, other: Self) -> Self {
                if self.real() > other.real() {
                    self
                } else {
                    other
                }
            }
            fn min(self, other: Self) -> Self {
                if self.real() < other.real() {
                    self
                } else {
                    other
                }
            }
            fn abs_sub(self, other: Self) -> Self {
                if self.real() > other.real() {
                    self - other
                } else {
                    Self::zero()
                }
            }
            fn cbrt(self) -> Self {
                let v = self.real();
                let c = v.cbrt();
                self.chain(c, c / (3.0 * v), -2.0 * c / (9.0 * v * v))
            }
            fn hypot(self, other: Self) -> Self {
                (self * self + other * other).sqrt()
            }
            fn sin(self) -> Self {
                let (s, c) = self.real().sin_cos();
                self.chain(s, c, -s)
            }
            fn cos(self) -> Self {
                let (s, c) = self.real().sin_cos();
                self.chain(c, -s, -c)
            }
            fn tan(self) -> Self {
                let t = self.real().tan();
                let sec2 = 1.0 + t * t;
                self.chain(t, sec2, 2.0 * t * sec2)
            }
            fn asin(self) -> Self {
                let v = self.real();
                let w = 1.0 - v * v;
                self.chain(v.asin(), 1.0 / w.sqrt(), v / (w * w.sqrt()))
            }
            fn acos(self) -> Self {
                let v = self.real();
                let w = 1.0 - v * v;
                self.chain(v.acos(), -1.0 / w.sqrt(), -v / (w * w.sqrt()))
            }
            fn atan(self) -> Self {
                let v = self.real();
                let w = 1.0 + v * v;
                self.chain(v.atan(), 1.0 / w, -2.0 * v / (w * w))
            }
            fn atan2(self, other: Self) -> Self {
                let mut result = (self / other).atan();
                result.set_real(self.real().atan2(other.real()));
                result
            }
            fn sin_cos(self) -> (Self, Self) {
                (self.sin(), self.cos())
            }
            fn exp_m1(self) -> Self {
                let v = self.real();
                let e = v.exp();
                self.chain(v.exp_m1(), e, e)
            }
            fn ln_1p(self) -> Self {
                let v = self.real();
                let w = 1.0 + v;
                self.chain(v.ln_1p(), 1.0 / w, -1.0 / (w * w))
            }
            fn sinh(self) -> Self {
                let v = self.real();
                self.chain(v.sinh(), v.cosh(), v.sinh())
            }
            fn cosh(self) -> Self {
                let v = self.real();
                self.chain(v.cosh(), v.sinh(), v.cosh())
            }
            fn tanh(self) -> Self {
                let t = self.real().tanh();
                let sech2 = 1.0 - t * t;
                self.chain(t, sech2, -2.0 * t * sech2)
            }
            fn asinh(self) -> Self {
                let v = self.real();
                let w = v * v + 1.0;
                self.chain(v.asinh(), 1.0 / w.sqrt(), -v / (w * w.sqrt()))
            }
            fn acosh(self) -> Self {
                let v = self.real();
                let w = v * v - 1.0;
                self.chain(v.acosh(), 1.0 / w.sqrt(), -v / (w * w.sqrt()))
            }
            fn atanh(self) -> Self {
                let v = self.real();
                let w = 1.0 - v * v;
                self.chain(v.atanh(), 1.0 / w, 2.0 * v / (w * w))
            }
            fn integer_decode(self) -> (u64, i16, i8) {
                self.real().integer_decode()
            }
        }
    };
}

impl_dual_numeric!(Dual);
impl_dual_numeric!(HyperDual);

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic<T: Float>(x: T) -> T {
        x * x * x
    }

    #[test]
    fn dual_carries_first_derivative() {
        let y = cubic(Dual::variable(2.0));
        assert!((y.val - 8.0).abs() < 1e-12);
        assert!((y.eps - 12.0).abs() < 1e-12);
    }

    #[test]
    fn hyperdual_carries_second_derivative() {
        let x = HyperDual::new(2.0, 1.0, 1.0, 0.0);
        let y = cubic(x);
        assert!((y.e1 - 12.0).abs() < 1e-12);
        assert!((y.e2 - 12.0).abs() < 1e-12);
        assert!((y.e12 - 12.0).abs() < 1e-12);
    }

    #[test]
    fn hyperdual_mixed_partial_of_product() {
        // f(x, y) = x^2 * y, d2f/dxdy = 2x.
        let x = HyperDual::new(3.0, 1.0, 0.0, 0.0);
        let y = HyperDual::new(5.0, 0.0, 1.0, 0.0);
        let f = x * x * y;
        assert!((f.e12 - 6.0).abs() < 1e-12);
    }

    #[test]
    fn constant_power_of_negative_base_stays_finite() {
        let base = Dual::variable(-0.5);
        let y = base.powf(Dual::from_f64(2.0).unwrap());
        assert!((y.val - 0.25).abs() < 1e-12);
        assert!((y.eps + 1.0).abs() < 1e-12);

        let hd = HyperDual::new(-0.5, 1.0, 1.0, 0.0).powf(HyperDual::from_f64(2.0).unwrap());
        assert!((hd.e12 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn transcendental_second_derivatives_match_closed_form() {
        let v = 0.7;
        let x = HyperDual::new(v, 1.0, 1.0, 0.0);
        assert!((x.sin().e12 + v.sin()).abs() < 1e-12);
        assert!((x.exp().e12 - v.exp()).abs() < 1e-12);
        assert!((x.ln().e12 + 1.0 / (v * v)).abs() < 1e-12);
        let t = v.tanh();
        assert!((x.tanh().e12 + 2.0 * t * (1.0 - t * t)).abs() < 1e-12);
    }

    #[test]
    fn division_matches_quotient_rule() {
        let x = Dual::variable(2.0);
        let y = Dual::one() / x;
        assert!((y.eps + 0.25).abs() < 1e-12);

        let hx = HyperDual::new(2.0, 1.0, 1.0, 0.0);
        let hy = HyperDual::one() / hx;
        assert!((hy.e12 - 0.25).abs() < 1e-12);
    }
}
