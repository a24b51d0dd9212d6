//! Output comparison against the reference snapshot.
//!
//! The verification norm is the sum of elementwise absolute differences;
//! complex types contribute their real and imaginary parts independently.

use tunesmith_device::{Complex32, Complex64, ElemType};

pub(crate) fn difference_norm(elem: ElemType, reference: &[u8], candidate: &[u8]) -> f64 {
    match elem {
        ElemType::Int32 => accumulate::<i32>(reference, candidate, |a, b| {
            (f64::from(a) - f64::from(b)).abs()
        }),
        ElemType::SizeT => accumulate::<u64>(reference, candidate, |a, b| {
            (a as f64 - b as f64).abs()
        }),
        ElemType::Float32 => accumulate::<f32>(reference, candidate, |a, b| {
            (f64::from(a) - f64::from(b)).abs()
        }),
        ElemType::Float64 => accumulate::<f64>(reference, candidate, |a, b| (a - b).abs()),
        ElemType::Complex32 => accumulate::<Complex32>(reference, candidate, |a, b| {
            (f64::from(a.re) - f64::from(b.re)).abs() + (f64::from(a.im) - f64::from(b.im)).abs()
        }),
        ElemType::Complex64 => accumulate::<Complex64>(reference, candidate, |a, b| {
            (a.re - b.re).abs() + (a.im - b.im).abs()
        }),
    }
}

fn accumulate<T: bytemuck::Pod>(
    reference: &[u8],
    candidate: &[u8],
    difference: impl Fn(T, T) -> f64,
) -> f64 {
    // Byte buffers carry no alignment guarantee, so read element-wise.
    let size = std::mem::size_of::<T>();
    reference
        .chunks_exact(size)
        .zip(candidate.chunks_exact(size))
        .map(|(a, b)| {
            difference(
                bytemuck::pod_read_unaligned(a),
                bytemuck::pod_read_unaligned(b),
            )
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_buffers_have_zero_norm() {
        let data: Vec<f32> = vec![1.0, -2.5, 3.25];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        assert_eq!(difference_norm(ElemType::Float32, bytes, bytes), 0.0);
    }

    #[test]
    fn differences_accumulate_over_elements() {
        let a: Vec<f64> = vec![1.0, 2.0, 3.0];
        let b: Vec<f64> = vec![1.5, 1.0, 3.0];
        let norm = difference_norm(
            ElemType::Float64,
            bytemuck::cast_slice(&a),
            bytemuck::cast_slice(&b),
        );
        assert!((norm - 1.5).abs() < 1e-12);
    }

    #[test]
    fn complex_parts_contribute_independently() {
        let a = vec![Complex32 { re: 1.0, im: 1.0 }];
        let b = vec![Complex32 { re: 0.5, im: 2.0 }];
        let norm = difference_norm(
            ElemType::Complex32,
            bytemuck::cast_slice(&a),
            bytemuck::cast_slice(&b),
        );
        assert!((norm - 1.5).abs() < 1e-6);
    }

    #[test]
    fn nan_poisons_the_norm() {
        let a: Vec<f32> = vec![f32::NAN];
        let b: Vec<f32> = vec![0.0];
        let norm = difference_norm(
            ElemType::Float32,
            bytemuck::cast_slice(&a),
            bytemuck::cast_slice(&b),
        );
        assert!(norm.is_nan());
    }
}
