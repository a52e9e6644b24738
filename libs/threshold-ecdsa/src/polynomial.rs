//! Scalar polynomials and Lagrange interpolation at zero.

use generic_ec::{curves::Secp256k1, Point, Scalar};
use rand::rngs::OsRng;
use thiserror::Error;

/// Interpolation input that does not determine a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    /// No points were supplied.
    #[error("no points to interpolate")]
    Empty,
    /// An abscissa of zero would be the secret itself.
    #[error("abscissa zero is not a share index")]
    ZeroIndex,
    /// Two points share an abscissa.
    #[error("duplicate abscissa {0}")]
    DuplicateIndex(u16),
}

pub(crate) fn index_scalar(index: u16) -> Scalar<Secp256k1> {
    Scalar::from_be_bytes_mod_order(index.to_be_bytes())
}

/// A polynomial over the scalar field, in coefficient form.
pub(crate) struct Polynomial {
    coefficients: Vec<Scalar<Secp256k1>>,
}

impl Polynomial {
    /// Sample a random polynomial of the given degree. When `constant` is
    /// set it becomes the shared secret at abscissa zero.
    pub(crate) fn random(degree: u16, constant: Option<Scalar<Secp256k1>>) -> Self {
        let mut rng = OsRng;
        let mut coefficients = Vec::with_capacity(usize::from(degree) + 1);
        coefficients.push(constant.unwrap_or_else(|| Scalar::random(&mut rng)));
        for _ in 0..degree {
            coefficients.push(Scalar::random(&mut rng));
        }
        Self { coefficients }
    }

    pub(crate) fn evaluate(&self, index: u16) -> Scalar<Secp256k1> {
        let x = index_scalar(index);
        let mut acc = Scalar::<Secp256k1>::zero();
        for coefficient in self.coefficients.iter().rev() {
            acc = acc * &x + coefficient;
        }
        acc
    }

    /// Feldman commitments to the coefficients.
    pub(crate) fn commitments(&self) -> Vec<Point<Secp256k1>> {
        self.coefficients.iter().map(|c| Point::generator().to_point() * c).collect()
    }
}

/// The committed evaluation `sum_l index^l * commitments[l]`.
pub(crate) fn committed_evaluation(commitments: &[Point<Secp256k1>], index: u16) -> Point<Secp256k1> {
    let x = index_scalar(index);
    let mut acc = Point::<Secp256k1>::zero();
    for commitment in commitments.iter().rev() {
        acc = acc * &x + commitment;
    }
    acc
}

fn lagrange_at_zero(indices: &[u16], position: usize) -> Result<Scalar<Secp256k1>, InterpolationError> {
    let own = indices[position];
    let own_scalar = index_scalar(own);
    let mut numerator = Scalar::<Secp256k1>::one();
    let mut denominator = Scalar::<Secp256k1>::one();
    for (other_position, other) in indices.iter().enumerate() {
        if other_position == position {
            continue;
        }
        let other_scalar = index_scalar(*other);
        numerator = numerator * &other_scalar;
        denominator = denominator * (other_scalar - &own_scalar);
    }
    let inverse = denominator.invert().ok_or(InterpolationError::DuplicateIndex(own))?;
    Ok(numerator * inverse)
}

fn check_indices(indices: &[u16]) -> Result<(), InterpolationError> {
    if indices.is_empty() {
        return Err(InterpolationError::Empty);
    }
    for (position, index) in indices.iter().enumerate() {
        if *index == 0 {
            return Err(InterpolationError::ZeroIndex);
        }
        if indices[..position].contains(index) {
            return Err(InterpolationError::DuplicateIndex(*index));
        }
    }
    Ok(())
}

/// Interpolate the value at zero from scalar evaluations.
pub(crate) fn interpolate_scalars_at_zero(
    points: &[(u16, Scalar<Secp256k1>)],
) -> Result<Scalar<Secp256k1>, InterpolationError> {
    let indices: Vec<u16> = points.iter().map(|(index, _)| *index).collect();
    check_indices(&indices)?;
    let mut acc = Scalar::<Secp256k1>::zero();
    for (position, (_, value)) in points.iter().enumerate() {
        acc = acc + lagrange_at_zero(&indices, position)? * value;
    }
    Ok(acc)
}

/// Interpolate the value at zero from curve-point evaluations ("in the
/// exponent").
pub(crate) fn interpolate_points_at_zero(
    points: &[(u16, Point<Secp256k1>)],
) -> Result<Point<Secp256k1>, InterpolationError> {
    let indices: Vec<u16> = points.iter().map(|(index, _)| *index).collect();
    check_indices(&indices)?;
    let mut acc = Point::<Secp256k1>::zero();
    for (position, (_, value)) in points.iter().enumerate() {
        acc = acc + value * &lagrange_at_zero(&indices, position)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shares_interpolate_back_to_the_constant() {
        let secret = Scalar::random(&mut OsRng);
        let poly = Polynomial::random(2, Some(secret));
        let points: Vec<_> = (1u16..=5).map(|i| (i, poly.evaluate(i))).collect();
        assert_eq!(interpolate_scalars_at_zero(&points[..3]).unwrap(), secret);
        assert_eq!(interpolate_scalars_at_zero(&points).unwrap(), secret);
    }

    #[test]
    fn point_interpolation_matches_scalar_interpolation() {
        let secret = Scalar::random(&mut OsRng);
        let poly = Polynomial::random(1, Some(secret));
        let points: Vec<_> =
            (1u16..=3).map(|i| (i, Point::generator().to_point() * &poly.evaluate(i))).collect();
        let expected = Point::generator().to_point() * &secret;
        assert_eq!(interpolate_points_at_zero(&points).unwrap(), expected);
    }

    #[test]
    fn committed_evaluation_matches_evaluation() {
        let poly = Polynomial::random(2, None);
        let commitments = poly.commitments();
        for index in [1u16, 4, 9] {
            let expected = Point::generator().to_point() * &poly.evaluate(index);
            assert_eq!(committed_evaluation(&commitments, index), expected);
        }
    }

    #[test]
    fn product_of_shares_interpolates_to_product_of_secrets() {
        // Point-wise products of two degree-t sharings form a degree-2t
        // sharing of the product; 2t + 1 evaluations pin it down.
        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        let poly_a = Polynomial::random(1, Some(a));
        let poly_b = Polynomial::random(1, Some(b));
        let points: Vec<_> = (1u16..=3).map(|i| (i, poly_a.evaluate(i) * poly_b.evaluate(i))).collect();
        assert_eq!(interpolate_scalars_at_zero(&points).unwrap(), a * b);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let value = Scalar::random(&mut OsRng);
        assert_eq!(interpolate_scalars_at_zero(&[]), Err(InterpolationError::Empty));
        assert_eq!(interpolate_scalars_at_zero(&[(0, value)]), Err(InterpolationError::ZeroIndex));
        assert_eq!(
            interpolate_scalars_at_zero(&[(2, value), (2, value)]),
            Err(InterpolationError::DuplicateIndex(2))
        );
    }
}
