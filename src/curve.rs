//! Edwards25519 arithmetic over the prime field GF(2^255 - 19).
//!
//! Points are held in extended twisted-Edwards coordinates (X:Y:Z:T) so a
//! scalar multiplication costs one field inversion, paid when the result is
//! encoded. Every loop here is iterative; nothing recurses on the scalar.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::OnceLock;

/// Length of an encoded point or scalar
pub const ENCODED_LEN: usize = 32;

/// q = 2^255 - 19
fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| (BigUint::one() << 255u32) - BigUint::from(19u32))
}

/// l = 2^252 + 27742317777372353535851937790883648493, the prime order of the base point
pub fn group_order() -> &'static BigUint {
    static ORDER: OnceLock<BigUint> = OnceLock::new();
    ORDER.get_or_init(|| {
        (BigUint::one() << 252u32) + BigUint::from(27_742_317_777_372_353_535_851_937_790_883_648_493u128)
    })
}

struct CurveConstants {
    /// d = -121665 / 121666
    d: FieldElement,
    d2: FieldElement,
    /// 2^((q-1)/4), a square root of -1
    sqrt_m1: FieldElement,
    /// (q+3)/8, the exponent of the candidate square root
    sqrt_exponent: BigUint,
}

fn curve() -> &'static CurveConstants {
    static CURVE: OnceLock<CurveConstants> = OnceLock::new();
    CURVE.get_or_init(|| {
        let q = prime();
        let d = -(&FieldElement::from_u64(121_665) * &FieldElement::from_u64(121_666).invert());
        let d2 = &d + &d;
        let sqrt_m1 = FieldElement::from_u64(2).pow(&((q - BigUint::one()) >> 2u32));
        let sqrt_exponent = (q + BigUint::from(3u32)) >> 3u32;
        CurveConstants {
            d,
            d2,
            sqrt_m1,
            sqrt_exponent,
        }
    })
}

fn base_point() -> &'static EdwardsPoint {
    static BASE: OnceLock<EdwardsPoint> = OnceLock::new();
    BASE.get_or_init(|| {
        let y = &FieldElement::from_u64(4) * &FieldElement::from_u64(5).invert();
        // y = 4/5 lies on the curve; the base point is the one with even x
        let x = recover_x(&y, false).unwrap_or_else(FieldElement::zero);
        EdwardsPoint::from_affine(x, y)
    })
}

/// Copy a reduced integer into 32 little-endian bytes
fn to_le32(n: &BigUint) -> [u8; ENCODED_LEN] {
    let mut out = [0u8; ENCODED_LEN];
    for (dst, src) in out.iter_mut().zip(n.to_bytes_le()) {
        *dst = src;
    }
    out
}

/// Reduce a little-endian integer of any width modulo the group order
pub fn scalar_from_le_bytes(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes) % group_order()
}

/// Encode a scalar below the group order as 32 little-endian bytes
pub fn scalar_to_bytes(scalar: &BigUint) -> [u8; ENCODED_LEN] {
    to_le32(&(scalar % group_order()))
}

/// An element of GF(q), always held fully reduced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldElement(BigUint);

impl FieldElement {
    pub fn zero() -> Self {
        FieldElement(BigUint::zero())
    }

    pub fn one() -> Self {
        FieldElement(BigUint::one())
    }

    pub fn from_u64(value: u64) -> Self {
        FieldElement(BigUint::from(value) % prime())
    }

    /// Interpret little-endian bytes as an integer and reduce it modulo q
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        FieldElement(BigUint::from_bytes_le(bytes) % prime())
    }

    pub fn to_le_bytes(&self) -> [u8; ENCODED_LEN] {
        to_le32(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parity of the canonical representative
    pub fn is_odd(&self) -> bool {
        self.0.to_bytes_le().first().map_or(false, |b| b & 1 == 1)
    }

    pub fn square(&self) -> Self {
        self * self
    }

    /// Square-and-multiply, most significant bit first
    pub fn pow(&self, exponent: &BigUint) -> Self {
        let mut acc = FieldElement::one();
        for byte in exponent.to_bytes_be() {
            for bit in (0..8).rev() {
                acc = acc.square();
                if (byte >> bit) & 1 == 1 {
                    acc = &acc * self;
                }
            }
        }
        acc
    }

    /// Multiplicative inverse via Fermat, x^(q-2). The inverse of zero is zero.
    pub fn invert(&self) -> Self {
        self.pow(&(prime() - BigUint::from(2u32)))
    }
}

impl Add for &FieldElement {
    type Output = FieldElement;

    fn add(self, rhs: &FieldElement) -> FieldElement {
        FieldElement((&self.0 + &rhs.0) % prime())
    }
}

impl Sub for &FieldElement {
    type Output = FieldElement;

    fn sub(self, rhs: &FieldElement) -> FieldElement {
        FieldElement((&self.0 + prime() - &rhs.0) % prime())
    }
}

impl Mul for &FieldElement {
    type Output = FieldElement;

    fn mul(self, rhs: &FieldElement) -> FieldElement {
        FieldElement((&self.0 * &rhs.0) % prime())
    }
}

impl Neg for FieldElement {
    type Output = FieldElement;

    fn neg(self) -> FieldElement {
        FieldElement((prime() - &self.0) % prime())
    }
}

/// Recover x from y on -x^2 + y^2 = 1 + d x^2 y^2.
///
/// q ≡ 5 (mod 8), so the candidate root is xx^((q+3)/8); when it squares to
/// -xx instead of xx it is fixed up by sqrt(-1). Returns `None` when y is not
/// the coordinate of a curve point, or when x = 0 is requested odd.
fn recover_x(y: &FieldElement, x_odd: bool) -> Option<FieldElement> {
    let c = curve();
    let yy = y.square();
    let u = &yy - &FieldElement::one();
    let v = &(&c.d * &yy) + &FieldElement::one();
    let xx = &u * &v.invert();

    let mut x = xx.pow(&c.sqrt_exponent);
    if x.square() != xx {
        x = &x * &c.sqrt_m1;
    }
    if x.square() != xx {
        return None;
    }

    if x.is_zero() && x_odd {
        return None;
    }
    if x.is_odd() != x_odd {
        x = -x;
    }
    Some(x)
}

/// A point on edwards25519 in extended coordinates
#[derive(Clone, Debug)]
pub struct EdwardsPoint {
    x: FieldElement,
    y: FieldElement,
    z: FieldElement,
    t: FieldElement,
}

impl EdwardsPoint {
    /// The neutral element (0, 1)
    pub fn identity() -> Self {
        EdwardsPoint {
            x: FieldElement::zero(),
            y: FieldElement::one(),
            z: FieldElement::one(),
            t: FieldElement::zero(),
        }
    }

    /// The standard base point B
    pub fn base() -> Self {
        base_point().clone()
    }

    pub fn from_affine(x: FieldElement, y: FieldElement) -> Self {
        let t = &x * &y;
        EdwardsPoint {
            x,
            y,
            z: FieldElement::one(),
            t,
        }
    }

    /// Unified addition (add-2008-hwcd-3); also valid for doubling
    pub fn add(&self, other: &EdwardsPoint) -> EdwardsPoint {
        let c = curve();
        let a = &(&self.y - &self.x) * &(&other.y - &other.x);
        let b = &(&self.y + &self.x) * &(&other.y + &other.x);
        let cc = &(&self.t * &c.d2) * &other.t;
        let zz = &self.z * &other.z;
        let dd = &zz + &zz;

        let e = &b - &a;
        let f = &dd - &cc;
        let g = &dd + &cc;
        let h = &b + &a;

        EdwardsPoint {
            x: &e * &f,
            y: &g * &h,
            t: &e * &h,
            z: &f * &g,
        }
    }

    pub fn double(&self) -> EdwardsPoint {
        self.add(self)
    }

    /// [scalar]P by double-and-add over the bits of `scalar`, most significant first
    pub fn mul_scalar(&self, scalar: &BigUint) -> EdwardsPoint {
        let mut acc = EdwardsPoint::identity();
        for byte in scalar.to_bytes_be() {
            for bit in (0..8).rev() {
                acc = acc.double();
                if (byte >> bit) & 1 == 1 {
                    acc = acc.add(self);
                }
            }
        }
        acc
    }

    /// Affine (x, y)
    pub fn to_affine(&self) -> (FieldElement, FieldElement) {
        let z_inv = self.z.invert();
        (&self.x * &z_inv, &self.y * &z_inv)
    }

    /// 32 bytes: y little-endian, with the parity of x in the top bit
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let (x, y) = self.to_affine();
        let mut bytes = y.to_le_bytes();
        if x.is_odd() {
            bytes[ENCODED_LEN - 1] |= 0x80;
        }
        bytes
    }

    /// Inverse of [`encode`](Self::encode). Rejects non-canonical y (y >= q)
    /// and encodings of y that are not on the curve.
    pub fn decode(bytes: &[u8; ENCODED_LEN]) -> Option<EdwardsPoint> {
        let x_odd = bytes[ENCODED_LEN - 1] & 0x80 != 0;
        let mut y_bytes = *bytes;
        y_bytes[ENCODED_LEN - 1] &= 0x7f;

        let y_int = BigUint::from_bytes_le(&y_bytes);
        if &y_int >= prime() {
            return None;
        }
        let y = FieldElement(y_int);
        let x = recover_x(&y, x_odd)?;
        Some(EdwardsPoint::from_affine(x, y))
    }

    pub fn is_identity(&self) -> bool {
        *self == EdwardsPoint::identity()
    }
}

impl PartialEq for EdwardsPoint {
    /// Projective equality: X1·Z2 = X2·Z1 and Y1·Z2 = Y2·Z1
    fn eq(&self, other: &Self) -> bool {
        &self.x * &other.z == &other.x * &self.z && &self.y * &other.z == &other.y * &self.z
    }
}

impl Eq for EdwardsPoint {}
