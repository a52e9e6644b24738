//! Bignum helpers for the dealer and the proof arithmetic.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::rngs::OsRng;

/// Miller-Rabin rounds. 2^-128 error bound for random candidates.
const PRIMALITY_ROUNDS: usize = 64;

/// Trial-division bound applied before Miller-Rabin.
const SMALL_PRIME_BOUND: u32 = 2048;

pub(crate) fn factorial(n: u16) -> BigUint {
    let mut acc = BigUint::one();
    for i in 2..=u64::from(n) {
        acc *= i;
    }
    acc
}

/// Evaluate `coefficients[0] + coefficients[1] x + ...` at `x`, mod `modulus`.
pub(crate) fn eval_poly_mod(coefficients: &[BigUint], x: &BigUint, modulus: &BigUint) -> BigUint {
    let mut acc = BigUint::zero();
    for coefficient in coefficients.iter().rev() {
        acc = (acc * x + coefficient) % modulus;
    }
    acc
}

/// A uniformly random element of `Z_n` coprime to `n`.
pub(crate) fn random_coprime(n: &BigUint) -> BigUint {
    let mut rng = OsRng;
    loop {
        let candidate = rng.gen_biguint_below(n);
        if !candidate.is_zero() && candidate.gcd(n).is_one() {
            return candidate;
        }
    }
}

fn small_primes() -> &'static [u32] {
    use std::sync::OnceLock;
    static PRIMES: OnceLock<Vec<u32>> = OnceLock::new();
    PRIMES.get_or_init(|| {
        // Plain sieve; the bound is tiny so this is immaterial.
        let bound = SMALL_PRIME_BOUND as usize;
        let mut composite = vec![false; bound];
        let mut primes = Vec::new();
        for i in 2..bound {
            if composite[i] {
                continue;
            }
            primes.push(i as u32);
            let mut j = i * i;
            while j < bound {
                composite[j] = true;
                j += i;
            }
        }
        primes
    })
}

/// Cheap rejection: true if `n` equals or is divisible by a sieved prime
/// (and is not that prime itself).
pub(crate) fn has_small_factor(n: &BigUint) -> bool {
    for p in small_primes() {
        let p = BigUint::from(*p);
        if n == &p {
            return false;
        }
        if (n % &p).is_zero() {
            return true;
        }
    }
    false
}

pub(crate) fn is_probable_prime(candidate: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    if candidate < &two {
        return false;
    }
    for p in small_primes() {
        let p = BigUint::from(*p);
        if candidate == &p {
            return true;
        }
        if (candidate % &p).is_zero() {
            return false;
        }
    }
    miller_rabin(candidate, PRIMALITY_ROUNDS)
}

fn miller_rabin(n: &BigUint, rounds: usize) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let n_minus_one = n - &one;

    // n - 1 = 2^s * d with d odd
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while d.is_even() {
        d >>= 1;
        s += 1;
    }

    let mut rng = OsRng;
    let low = two.clone();
    let high = n_minus_one.clone();
    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_range(&low, &high);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn factorial_small() {
        assert_eq!(factorial(0), BigUint::one());
        assert_eq!(factorial(1), BigUint::one());
        assert_eq!(factorial(5), BigUint::from(120u32));
    }

    #[test]
    fn poly_eval() {
        // 3 + 2x + x^2 at x = 5, mod 1000 -> 38
        let coefficients = vec![BigUint::from(3u32), BigUint::from(2u32), BigUint::from(1u32)];
        let result = eval_poly_mod(&coefficients, &BigUint::from(5u32), &BigUint::from(1000u32));
        assert_eq!(result, BigUint::from(38u32));
    }

    #[test]
    fn primality_known_values() {
        assert!(is_probable_prime(&BigUint::from(2u32)));
        assert!(is_probable_prime(&BigUint::from(65537u32)));
        // 2^61 - 1 is a Mersenne prime.
        assert!(is_probable_prime(&(BigUint::from(2u32).pow(61) - BigUint::one())));
        assert!(!is_probable_prime(&BigUint::from(1u32)));
        assert!(!is_probable_prime(&BigUint::from(65535u32)));
        // Carmichael number.
        assert!(!is_probable_prime(&BigUint::from(561u32)));
    }

    #[test]
    fn random_coprime_is_coprime() {
        use num_integer::Integer;
        use num_traits::One;
        let n = BigUint::from(3u32 * 5 * 7 * 11);
        for _ in 0..16 {
            let candidate = random_coprime(&n);
            assert!(candidate.gcd(&n).is_one());
            assert!(candidate < n);
        }
    }
}
