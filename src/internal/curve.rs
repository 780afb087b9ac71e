use crate::internal::errors::PreErrors;
use crate::internal::schemes::{unsafe_hash_to_point, Blake2bHash};
use crate::internal::utils::to_hex;

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::sync::Arc;

use openssl::bn::{BigNum, BigNumContext, BigNumRef};
use openssl::ec::{EcGroup, EcGroupRef, EcPoint, EcPointRef, PointConversionForm};
use openssl::nid::Nid;

const U_POINT_LABEL: &[u8] = b"NuCypher/UmbralParameters/u";

/// Curve parameters shared by every key, point and scalar of one system.
///
/// `Params` holds no scratch state: every operation allocates its own
/// `BigNumContext`, so a single `Arc<Params>` can be used from any thread.
pub struct Params {
    group: EcGroup,
    order: BigNum,
    order_minus_two: BigNum,
    u_point: EcPoint,
    field_order_size_in_bytes: usize,
    group_order_size_in_bytes: usize,
}

impl Params {
    pub fn new(curve_name: Nid) -> Result<Self, PreErrors> {
        let mut ctx = BigNumContext::new()?;
        let group = EcGroup::from_curve_name(curve_name)?;
        let mut order = BigNum::new()?;
        group.order(&mut order, &mut ctx)?;
        let two = BigNum::from_u32(2)?;
        let mut order_minus_two = BigNum::new()?;
        order_minus_two.checked_sub(&order, &two)?;

        let generator_bytes =
            group
                .generator()
                .to_bytes(&group, PointConversionForm::COMPRESSED, &mut ctx)?;
        let u_point =
            unsafe_hash_to_point::<Blake2bHash>(&generator_bytes, U_POINT_LABEL, &group, &mut ctx)?;

        Ok(Params {
            field_order_size_in_bytes: ((group.degree() + 7) / 8) as usize,
            group_order_size_in_bytes: order.num_bytes() as usize,
            group,
            order,
            order_minus_two,
            u_point,
        })
    }

    pub fn group(&self) -> &EcGroupRef {
        &self.group
    }

    pub fn order(&self) -> &BigNumRef {
        &self.order
    }

    /// The second generator `U`, with unknown discrete log w.r.t. `G`.
    pub fn u_point(&self) -> &EcPointRef {
        &self.u_point
    }

    pub fn field_order_size_in_bytes(&self) -> usize {
        self.field_order_size_in_bytes
    }

    pub fn group_order_size_in_bytes(&self) -> usize {
        self.group_order_size_in_bytes
    }

    pub fn same_curve(&self, other: &Params) -> bool {
        self.group.curve_name().is_some() && self.group.curve_name() == other.group.curve_name()
    }
}

fn new_ctx() -> BigNumContext {
    BigNumContext::new().expect("Error in BN context allocation")
}

/// A scalar modulo the group order.
///
/// Every value is flagged `BN_FLG_CONSTTIME` and wiped when dropped.
pub struct CurveBN {
    bn: BigNum,
    params: Arc<Params>,
}

impl CurveBN {
    fn wrap(mut bn: BigNum, params: &Arc<Params>) -> Self {
        bn.set_const_time();
        CurveBN {
            bn,
            params: Arc::clone(params),
        }
    }

    pub fn from_u32(n: u32, params: &Arc<Params>) -> Self {
        Self::wrap(
            BigNum::from_u32(n).expect("Error in BN creation"),
            params,
        )
    }

    pub fn from_big_num(n: &BigNumRef, params: &Arc<Params>) -> Result<Self, PreErrors> {
        Ok(Self::wrap(n.to_owned()?, params))
    }

    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let bn = BigNum::from_slice(bytes)?;
        if !Self::in_range(&bn, params) {
            return Err(PreErrors::InvalidBytes);
        }
        Ok(Self::wrap(bn, params))
    }

    /// Uniform in `[1, q - 1]`.
    pub fn random(params: &Arc<Params>) -> Result<Self, PreErrors> {
        let mut rand = BigNum::new()?;
        loop {
            params.order().rand_range(&mut rand)?;
            if Self::in_range(&rand, params) {
                return Ok(Self::wrap(rand, params));
            }
        }
    }

    fn in_range(bn: &BigNumRef, params: &Params) -> bool {
        bn.num_bits() > 0 && !bn.is_negative() && bn < params.order()
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        params.group_order_size_in_bytes()
    }

    /// Big-endian, left padded to the order size.
    pub fn to_bytes(&self) -> Vec<u8> {
        let raw = self.bn.to_vec();
        let mut bytes = vec![0u8; self.params.group_order_size_in_bytes().saturating_sub(raw.len())];
        bytes.extend_from_slice(&raw);
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.bn.num_bits() == 0
    }

    /// `self^(q-2) mod q`; constant time, unlike `BN_mod_inverse`.
    pub fn invert(&self) -> Self {
        let mut res = BigNum::new().expect("Error in BN creation");
        res.mod_exp(
            &self.bn,
            &self.params.order_minus_two,
            &self.params.order,
            &mut new_ctx(),
        )
        .expect("Error in BN inversion");
        Self::wrap(res, &self.params)
    }

    pub fn bn(&self) -> &BigNumRef {
        &self.bn
    }

    pub fn params(&self) -> &Arc<Params> {
        &self.params
    }
}

impl Drop for CurveBN {
    fn drop(&mut self) {
        self.bn.clear();
    }
}

impl Clone for CurveBN {
    fn clone(&self) -> Self {
        Self::wrap(
            self.bn.to_owned().expect("Error in BN cloning"),
            &self.params,
        )
    }
}

impl PartialEq for CurveBN {
    fn eq(&self, other: &CurveBN) -> bool {
        self.params.same_curve(&other.params) && self.bn == other.bn
    }
}

impl fmt::Debug for CurveBN {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("CurveBN(..)")
    }
}

macro_rules! impl_scalar_op {
    ($trait:ident, $method:ident, $bn_op:ident) => {
        impl $trait for &CurveBN {
            type Output = CurveBN;

            fn $method(self, other: &CurveBN) -> CurveBN {
                let mut res = BigNum::new().expect("Error in BN creation");
                res.$bn_op(&self.bn, &other.bn, self.params.order(), &mut new_ctx())
                    .expect("Error in BN arithmetic");
                CurveBN::wrap(res, &self.params)
            }
        }
    };
}

impl_scalar_op!(Add, add, mod_add);
impl_scalar_op!(Sub, sub, mod_sub);
impl_scalar_op!(Mul, mul, mod_mul);

impl Div for &CurveBN {
    type Output = CurveBN;

    fn div(self, other: &CurveBN) -> CurveBN {
        self * &other.invert()
    }
}

/// A point on the curve, encoded in compressed SEC1 form.
pub struct CurvePoint {
    point: EcPoint,
    params: Arc<Params>,
}

impl CurvePoint {
    pub fn from_ec_point(p: &EcPointRef, params: &Arc<Params>) -> Result<Self, PreErrors> {
        Ok(CurvePoint {
            point: p.to_owned(params.group())?,
            params: Arc::clone(params),
        })
    }

    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let point = EcPoint::from_bytes(params.group(), bytes, &mut new_ctx())
            .map_err(|_| PreErrors::InvalidBytes)?;
        Ok(CurvePoint {
            point,
            params: Arc::clone(params),
        })
    }

    pub fn mul_gen(scalar: &CurveBN, params: &Arc<Params>) -> Self {
        let mut res = EcPoint::new(params.group()).expect("Error in Point creation");
        res.mul_generator(params.group(), &scalar.bn, &new_ctx())
            .expect("Error in Point multiplication");
        CurvePoint {
            point: res,
            params: Arc::clone(params),
        }
    }

    pub fn u_point(params: &Arc<Params>) -> Self {
        CurvePoint {
            point: params
                .u_point()
                .to_owned(params.group())
                .expect("Error in Point cloning"),
            params: Arc::clone(params),
        }
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        1 + params.field_order_size_in_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode(PointConversionForm::COMPRESSED)
    }

    /// `x || y`, without the SEC1 prefix byte.
    pub fn to_affine_bytes(&self) -> Vec<u8> {
        let mut bytes = self.encode(PointConversionForm::UNCOMPRESSED);
        bytes.remove(0);
        bytes
    }

    fn encode(&self, form: PointConversionForm) -> Vec<u8> {
        self.point
            .to_bytes(self.params.group(), form, &mut new_ctx())
            .expect("Error in Point to bytes")
    }

    pub fn point(&self) -> &EcPointRef {
        &self.point
    }

    pub fn params(&self) -> &Arc<Params> {
        &self.params
    }
}

impl Clone for CurvePoint {
    fn clone(&self) -> Self {
        CurvePoint {
            point: self
                .point
                .to_owned(self.params.group())
                .expect("Error in Point cloning"),
            params: Arc::clone(&self.params),
        }
    }
}

impl PartialEq for CurvePoint {
    fn eq(&self, other: &CurvePoint) -> bool {
        self.params.same_curve(&other.params)
            && self
                .point
                .eq(self.params.group(), &other.point, &mut new_ctx())
                .unwrap_or(false)
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CurvePoint({})", to_hex(&self.to_bytes()))
    }
}

impl Add for &CurvePoint {
    type Output = CurvePoint;

    fn add(self, other: &CurvePoint) -> CurvePoint {
        let mut res = EcPoint::new(self.params.group()).expect("Error in Point creation");
        res.add(self.params.group(), &self.point, &other.point, &mut new_ctx())
            .expect("Error in Point addition");
        CurvePoint {
            point: res,
            params: Arc::clone(&self.params),
        }
    }
}

impl Mul<&CurveBN> for &CurvePoint {
    type Output = CurvePoint;

    fn mul(self, scalar: &CurveBN) -> CurvePoint {
        let mut res = EcPoint::new(self.params.group()).expect("Error in Point creation");
        res.mul(self.params.group(), &self.point, &scalar.bn, &new_ctx())
            .expect("Error in Point multiplication");
        CurvePoint {
            point: res,
            params: Arc::clone(&self.params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pre::new_standard_params;

    #[test]
    fn curve_bn() {
        let params = new_standard_params().unwrap();
        let one = &CurveBN::from_u32(1, &params);
        let two = &CurveBN::from_u32(2, &params);
        let ten = &CurveBN::from_u32(10, &params);
        let three = one + two;
        assert_eq!(three.bn().to_vec(), vec![3; 1]);

        let nine = ten - one;
        assert_eq!(nine.bn().to_vec(), vec![9; 1]);

        let three_again = &nine / &three;
        assert_eq!(three_again.bn().to_vec(), vec![3; 1]);

        let eighteen = &nine * two;
        assert_eq!(eighteen.bn().to_vec(), vec![18; 1]);
    }

    #[test]
    fn inversion_and_wraparound() {
        let params = new_standard_params().unwrap();
        let r = CurveBN::random(&params).unwrap();
        let one = CurveBN::from_u32(1, &params);
        assert_eq!(&r * &r.invert(), one);

        let zero = &r - &r;
        assert!(zero.is_zero());
        assert!(!r.is_zero());
    }

    #[test]
    fn bytes_conv() {
        let params = new_standard_params().unwrap();
        let r = CurveBN::random(&params).unwrap();
        let p = CurvePoint::mul_gen(&r, &params);

        let r_bytes = r.to_bytes();
        assert_eq!(r_bytes.len(), CurveBN::expected_bytes_length(&params));
        assert_eq!(CurveBN::from_bytes(&r_bytes, &params).unwrap(), r);

        let p_bytes = p.to_bytes();
        assert_eq!(p_bytes.len(), CurvePoint::expected_bytes_length(&params));
        let p_new = CurvePoint::from_bytes(&p_bytes, &params).unwrap();
        assert_eq!(p_new, p);
        assert_eq!(p.to_affine_bytes().len(), 64);

        // zero and anything >= q are not valid scalars
        let zero = vec![0u8; CurveBN::expected_bytes_length(&params)];
        assert_eq!(CurveBN::from_bytes(&zero, &params), Err(PreErrors::InvalidBytes));
        let mut order = params.order().to_vec();
        assert_eq!(CurveBN::from_bytes(&order, &params), Err(PreErrors::InvalidBytes));
        order.pop();
        assert_eq!(CurveBN::from_bytes(&order, &params), Err(PreErrors::InvalidBytes));
    }

    #[test]
    fn point_arithmetic() {
        let params = new_standard_params().unwrap();
        let a = CurveBN::random(&params).unwrap();
        let b = CurveBN::random(&params).unwrap();
        let lhs = CurvePoint::mul_gen(&(&a + &b), &params);
        let rhs = &CurvePoint::mul_gen(&a, &params) + &CurvePoint::mul_gen(&b, &params);
        assert_eq!(lhs, rhs);

        let u = CurvePoint::u_point(&params);
        assert_eq!(&(&u * &a) * &b, &u * &(&a * &b));
        assert_ne!(u, CurvePoint::mul_gen(&CurveBN::from_u32(1, &params), &params));
    }
}
