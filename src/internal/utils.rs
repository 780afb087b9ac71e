use crate::internal::curve::CurveBN;

use sha2::{Digest, Sha512};

/// Lagrange coefficient at zero for the share index `x_i` among `xs`.
pub fn lambda_coeff(x_i: &CurveBN, xs: &[CurveBN]) -> CurveBN {
    let mut result = CurveBN::from_u32(1, x_i.params());
    for x_j in xs.iter().filter(|x_j| *x_j != x_i) {
        result = &result * &(x_j / &(x_j - x_i));
    }
    result
}

/// Horner evaluation; `coefficients[0]` is the constant term.
pub fn poly_eval(coefficients: &[CurveBN], x: &CurveBN) -> CurveBN {
    let mut iter = coefficients.iter().rev();
    let mut result = match iter.next() {
        Some(c) => c.clone(),
        None => return CurveBN::from_u32(0, x.params()),
    };
    for c in iter {
        result = &(&result * x) + c;
    }
    result
}

/// Stable 8-byte tag for a named constant.
pub fn new_constant_sorrow(name: &str) -> Vec<u8> {
    Sha512::digest(name.as_bytes())[..8].to_vec()
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
