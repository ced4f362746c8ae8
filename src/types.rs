//! Type descriptors - the signature vocabulary shared by every component
//!
//! Design: A closed set of kinds with C layout rules. Descriptors are
//! immutable once built and shared through `Arc`, so a CIF, the cache and
//! any number of in-flight calls can reference the same description.

use std::sync::Arc;

use crate::abi::Abi;
use crate::error::FfiError;

/// Shared handle to a type descriptor
pub type TypeRef = Arc<TypeDescriptor>;

/// Numeric type codes, stable across the C boundary
pub mod code {
    pub const VOID: u32 = 0;
    pub const INT: u32 = 1;
    pub const FLOAT: u32 = 2;
    pub const DOUBLE: u32 = 3;
    pub const LONGDOUBLE: u32 = 4;
    pub const UINT8: u32 = 5;
    pub const SINT8: u32 = 6;
    pub const UINT16: u32 = 7;
    pub const SINT16: u32 = 8;
    pub const UINT32: u32 = 9;
    pub const SINT32: u32 = 10;
    pub const UINT64: u32 = 11;
    pub const SINT64: u32 = 12;
    pub const STRUCT: u32 = 13;
    pub const POINTER: u32 = 14;
}

/// Kind of a described type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Pointer,
    Float,
    Double,
    /// 128-bit IEEE quad, carried as opaque bytes
    LongDouble,
    /// Flat, ordered member list
    Struct(Vec<TypeRef>),
}

impl TypeKind {
    /// Type code for this kind
    #[inline]
    pub fn code(&self) -> u32 {
        match self {
            Self::Void => code::VOID,
            Self::U8 => code::UINT8,
            Self::I8 => code::SINT8,
            Self::U16 => code::UINT16,
            Self::I16 => code::SINT16,
            Self::U32 => code::UINT32,
            Self::I32 => code::SINT32,
            Self::U64 => code::UINT64,
            Self::I64 => code::SINT64,
            Self::Pointer => code::POINTER,
            Self::Float => code::FLOAT,
            Self::Double => code::DOUBLE,
            Self::LongDouble => code::LONGDOUBLE,
            Self::Struct(_) => code::STRUCT,
        }
    }
}

/// Layout description of one C type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    kind: TypeKind,
    size: usize,
    alignment: usize,
}

impl TypeDescriptor {
    const fn scalar(kind: TypeKind, size: usize) -> Self {
        Self {
            kind,
            size,
            alignment: size,
        }
    }

    pub fn void() -> TypeRef {
        Arc::new(Self {
            kind: TypeKind::Void,
            size: 1,
            alignment: 1,
        })
    }

    pub fn uint8() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::U8, 1))
    }

    pub fn sint8() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::I8, 1))
    }

    pub fn uint16() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::U16, 2))
    }

    pub fn sint16() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::I16, 2))
    }

    pub fn uint32() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::U32, 4))
    }

    pub fn sint32() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::I32, 4))
    }

    pub fn uint64() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::U64, 8))
    }

    pub fn sint64() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::I64, 8))
    }

    /// Host-sized pointer; an argument image carries `Abi::pointer_width` bytes
    pub fn pointer() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::Pointer, core::mem::size_of::<usize>()))
    }

    pub fn float() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::Float, 4))
    }

    pub fn double() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::Double, 8))
    }

    pub fn long_double() -> TypeRef {
        Arc::new(Self::scalar(TypeKind::LongDouble, 16))
    }

    /// Build a struct with natural C layout
    ///
    /// Each member sits at its own alignment; the total size is rounded up
    /// to the largest member alignment.
    pub fn structure(members: Vec<TypeRef>) -> Result<TypeRef, FfiError> {
        if members.is_empty() {
            return Err(FfiError::BadTypedef("struct has no members"));
        }

        let mut size = 0usize;
        let mut alignment = 1usize;
        for member in &members {
            if member.kind == TypeKind::Void {
                return Err(FfiError::BadTypedef("struct member of type void"));
            }
            size = align_up(size, member.alignment) + member.size;
            alignment = alignment.max(member.alignment);
        }

        Ok(Arc::new(Self {
            kind: TypeKind::Struct(members),
            size: align_up(size, alignment),
            alignment,
        }))
    }

    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes this value occupies in an argument image of `abi`
    #[inline]
    pub fn abi_size(&self, abi: Abi) -> usize {
        match self.kind {
            TypeKind::Pointer => abi.pointer_width(),
            _ => self.size,
        }
    }

    /// Alignment inside an argument image of `abi`
    #[inline]
    pub fn abi_alignment(&self, abi: Abi) -> usize {
        match self.kind {
            TypeKind::Pointer => abi.pointer_width(),
            _ => self.alignment,
        }
    }

    #[inline]
    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    #[inline]
    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_))
    }

    /// Float, double or long double
    #[inline]
    pub fn is_floating(&self) -> bool {
        matches!(self.kind, TypeKind::Float | TypeKind::Double | TypeKind::LongDouble)
    }

    /// Struct members (empty for scalars)
    #[inline]
    pub fn members(&self) -> &[TypeRef] {
        match &self.kind {
            TypeKind::Struct(members) => members,
            _ => &[],
        }
    }

    /// Byte offset of every struct member
    pub fn member_offsets(&self) -> Vec<usize> {
        let mut offset = 0usize;
        self.members()
            .iter()
            .map(|member| {
                let at = align_up(offset, member.alignment);
                offset = at + member.size;
                at
            })
            .collect()
    }
}

/// Round `value` up to a multiple of `align` (a power of two)
#[inline(always)]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Number of whole argument slots a value of `size` bytes consumes
#[inline(always)]
pub(crate) const fn slots_for(size: usize, word: usize) -> usize {
    let slots = (size + word - 1) / word;
    if slots == 0 { 1 } else { slots }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_layout() {
        assert_eq!(TypeDescriptor::sint8().size(), 1);
        assert_eq!(TypeDescriptor::uint16().alignment(), 2);
        assert_eq!(TypeDescriptor::double().size(), 8);
        assert_eq!(TypeDescriptor::long_double().alignment(), 16);
        assert_eq!(TypeDescriptor::pointer().size(), core::mem::size_of::<usize>());
    }

    #[test]
    fn test_struct_layout_pads_members() {
        let ty = TypeDescriptor::structure(vec![
            TypeDescriptor::uint8(),
            TypeDescriptor::sint32(),
            TypeDescriptor::uint16(),
        ])
        .unwrap();

        assert_eq!(ty.member_offsets(), vec![0, 4, 8]);
        assert_eq!(ty.size(), 12);
        assert_eq!(ty.alignment(), 4);
        assert_eq!(ty.code(), code::STRUCT);
    }

    #[test]
    fn test_empty_struct_rejected() {
        assert!(matches!(
            TypeDescriptor::structure(vec![]),
            Err(FfiError::BadTypedef(_))
        ));
        assert!(TypeDescriptor::structure(vec![TypeDescriptor::void()]).is_err());
    }

    #[test]
    fn test_slot_math() {
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(slots_for(1, 8), 1);
        assert_eq!(slots_for(12, 8), 2);
        assert_eq!(slots_for(8, 4), 2);
    }

    #[test]
    fn test_pointer_takes_abi_width() {
        let ptr = TypeDescriptor::pointer();
        assert_eq!(ptr.abi_size(Abi::Rv32), 4);
        assert_eq!(ptr.abi_alignment(Abi::Rv32SoftFloat), 4);
        assert_eq!(ptr.abi_size(Abi::Rv64), 8);
        assert_eq!(TypeDescriptor::double().abi_size(Abi::Rv32), 8);
        assert_eq!(TypeDescriptor::double().abi_alignment(Abi::Rv32), 8);
    }

    #[test]
    fn test_floating_kinds() {
        assert!(TypeDescriptor::float().is_floating());
        assert!(TypeDescriptor::long_double().is_floating());
        assert!(!TypeDescriptor::uint64().is_floating());
        assert!(TypeDescriptor::pointer().members().is_empty());
    }
}
