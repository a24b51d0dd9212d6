//! Element types storable in tuner buffers.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Single-precision complex number, laid out as two consecutive floats.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

/// Double-precision complex number.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

/// Runtime tag for the element type of a buffer. Drives output resets and
/// reference comparison without one code path per Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElemType {
    Int32,
    SizeT,
    Float32,
    Float64,
    Complex32,
    Complex64,
}

impl ElemType {
    pub fn size_bytes(&self) -> usize {
        match self {
            ElemType::Int32 | ElemType::Float32 => 4,
            ElemType::SizeT | ElemType::Float64 | ElemType::Complex32 => 8,
            ElemType::Complex64 => 16,
        }
    }
}

/// Types that can live in a device buffer. Sealed to the six types the
/// tuner supports.
pub trait Element: Pod + private::Sealed {
    const TYPE: ElemType;
}

impl Element for i32 {
    const TYPE: ElemType = ElemType::Int32;
}
impl Element for u64 {
    const TYPE: ElemType = ElemType::SizeT;
}
impl Element for f32 {
    const TYPE: ElemType = ElemType::Float32;
}
impl Element for f64 {
    const TYPE: ElemType = ElemType::Float64;
}
impl Element for Complex32 {
    const TYPE: ElemType = ElemType::Complex32;
}
impl Element for Complex64 {
    const TYPE: ElemType = ElemType::Complex64;
}

mod private {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for u64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for super::Complex32 {}
    impl Sealed for super::Complex64 {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_layout() {
        assert_eq!(ElemType::Int32.size_bytes(), std::mem::size_of::<i32>());
        assert_eq!(ElemType::SizeT.size_bytes(), std::mem::size_of::<u64>());
        assert_eq!(
            ElemType::Complex32.size_bytes(),
            std::mem::size_of::<Complex32>()
        );
        assert_eq!(
            ElemType::Complex64.size_bytes(),
            std::mem::size_of::<Complex64>()
        );
    }
}
