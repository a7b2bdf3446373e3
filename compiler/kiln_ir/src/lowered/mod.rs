//! Lowered IR: the flat per-file instruction stream.
//!
//! A file lowers to four parallel arrays:
//! - `tags`: one `InstTag` per instruction
//! - `data`: two `u32` operands per instruction
//! - `string_bytes`: NUL-terminated strings addressed by byte offset
//! - `extra`: variable-length payloads addressed by word offset
//!
//! Instruction 0 is always the file's main struct. `extra[0]` holds the
//! payload index of the compile-error list, or 0 if lowering succeeded.
//!
//! # Payload layouts
//!
//! Container (`StructDecl`, `UnionDecl`, `EnumDecl`, `OpaqueDecl`), `data.a`:
//! `[fields_hash.lo, fields_hash.hi, src_node, fields_len, decls_len,
//!   (field_name, field_type)*, decl_inst*]`; a field without a type stores
//! `u32::MAX`.
//!
//! `Declaration`, `data.a`:
//! `[name_kind, name, flags, src_hash.lo, src_hash.hi, src_node, body_len, body*]`.
//! The last body instruction is the declaration's value.
//!
//! `Func`, `data.a`: `[ret_type, flags, src_node, body_len, body*]`.
//!
//! `ExportValue`: `data.a` is the operand, `data.b` points at
//! `[name, linkage, section, src_node]`.
//!
//! Compile errors: `[count, (message, byte_offset)*]`.

mod builder;

pub use builder::{ContainerSpec, DeclSpec, ExportSpec, FuncSpec, IrBuilder};

use crate::ContentHash;
use std::fmt;

/// Index of an instruction within one file's lowered IR.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct InstIndex(u32);

impl InstIndex {
    /// The file's top-level struct.
    pub const MAIN_STRUCT: InstIndex = InstIndex(0);

    pub(crate) const NONE_RAW: u32 = u32::MAX;

    #[inline]
    pub const fn new(raw: u32) -> Self {
        InstIndex(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_optional(raw: u32) -> Option<Self> {
        (raw != Self::NONE_RAW).then_some(InstIndex(raw))
    }

    pub(crate) fn to_optional(inst: Option<InstIndex>) -> u32 {
        inst.map_or(Self::NONE_RAW, InstIndex::raw)
    }
}

impl fmt::Debug for InstIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Byte offset of a NUL-terminated string in `string_bytes`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[repr(transparent)]
pub struct NullTerminatedString(pub u32);

impl NullTerminatedString {
    pub const EMPTY: NullTerminatedString = NullTerminatedString(0);
}

/// Instruction opcode.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum InstTag {
    StructDecl = 0,
    UnionDecl = 1,
    EnumDecl = 2,
    OpaqueDecl = 3,
    Declaration = 4,
    /// `data.a`/`data.b`: low/high words of an `i64`.
    Int = 5,
    /// `data.a`: 1 if signed, `data.b`: bit count.
    IntType = 6,
    /// `data.a`: `Primitive` code.
    PrimType = 7,
    /// `data.a`: child type inst, `data.b`: 1 if const.
    PtrType = 8,
    /// `data.a`: name, `data.b`: src node.
    DeclVal = 9,
    /// `data.a`: name, `data.b`: src node.
    DeclRef = 10,
    /// `data.a`: operand, `data.b`: src node.
    SizeOf = 11,
    /// `data.a`: lhs, `data.b`: rhs.
    Add = 12,
    /// `data.a`: error name, `data.b`: src node.
    ErrorValue = 13,
    Func = 14,
    /// `data.a`: callee, `data.b`: src node.
    Call = 15,
    /// `data.a`: operand or `u32::MAX`, `data.b`: src node.
    Return = 16,
    ExportValue = 17,
    /// `data.a`: message, `data.b`: src node.
    CompileError = 18,
}

impl InstTag {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => InstTag::StructDecl,
            1 => InstTag::UnionDecl,
            2 => InstTag::EnumDecl,
            3 => InstTag::OpaqueDecl,
            4 => InstTag::Declaration,
            5 => InstTag::Int,
            6 => InstTag::IntType,
            7 => InstTag::PrimType,
            8 => InstTag::PtrType,
            9 => InstTag::DeclVal,
            10 => InstTag::DeclRef,
            11 => InstTag::SizeOf,
            12 => InstTag::Add,
            13 => InstTag::ErrorValue,
            14 => InstTag::Func,
            15 => InstTag::Call,
            16 => InstTag::Return,
            17 => InstTag::ExportValue,
            18 => InstTag::CompileError,
            _ => return None,
        })
    }

    /// Container kind if this instruction declares a namespace.
    pub fn container_kind(self) -> Option<ContainerKind> {
        match self {
            InstTag::StructDecl => Some(ContainerKind::Struct),
            InstTag::UnionDecl => Some(ContainerKind::Union),
            InstTag::EnumDecl => Some(ContainerKind::Enum),
            InstTag::OpaqueDecl => Some(ContainerKind::Opaque),
            _ => None,
        }
    }

    pub fn is_namespace_decl(self) -> bool {
        self.container_kind().is_some()
    }
}

/// Kinds of namespace-declaring instructions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ContainerKind {
    Struct,
    Union,
    Enum,
    Opaque,
}

impl ContainerKind {
    pub fn tag(self) -> InstTag {
        match self {
            ContainerKind::Struct => InstTag::StructDecl,
            ContainerKind::Union => InstTag::UnionDecl,
            ContainerKind::Enum => InstTag::EnumDecl,
            ContainerKind::Opaque => InstTag::OpaqueDecl,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ContainerKind::Struct => "struct",
            ContainerKind::Union => "union",
            ContainerKind::Enum => "enum",
            ContainerKind::Opaque => "opaque",
        }
    }
}

/// Built-in non-integer types named by `PrimType`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Primitive {
    Void = 0,
    Bool = 1,
    Type = 2,
    ComptimeInt = 3,
    Noreturn = 4,
}

impl Primitive {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Primitive::Void,
            1 => Primitive::Bool,
            2 => Primitive::Type,
            3 => Primitive::ComptimeInt,
            4 => Primitive::Noreturn,
            _ => return None,
        })
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "void" => Primitive::Void,
            "bool" => Primitive::Bool,
            "type" => Primitive::Type,
            "comptime_int" => Primitive::ComptimeInt,
            "noreturn" => Primitive::Noreturn,
            _ => return None,
        })
    }
}

/// Symbol linkage requested by an export.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Linkage {
    Internal = 0,
    #[default]
    Strong = 1,
    Weak = 2,
    LinkOnce = 3,
}

impl Linkage {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Linkage::Internal,
            2 => Linkage::Weak,
            3 => Linkage::LinkOnce,
            _ => Linkage::Strong,
        }
    }
}

/// Two operand words per instruction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct InstData {
    pub a: u32,
    pub b: u32,
}

crate::static_assert_size!(InstData, 8);

/// How a declaration is named.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeclName {
    Named(NullTerminatedString),
    NamedTest(NullTerminatedString),
    UnnamedTest,
    Comptime,
    Usingnamespace,
}

impl DeclName {
    fn encode(self) -> [u32; 2] {
        match self {
            DeclName::Named(s) => [0, s.0],
            DeclName::NamedTest(s) => [1, s.0],
            DeclName::UnnamedTest => [2, 0],
            DeclName::Comptime => [3, 0],
            DeclName::Usingnamespace => [4, 0],
        }
    }

    fn decode(kind: u32, name: u32) -> Self {
        match kind {
            0 => DeclName::Named(NullTerminatedString(name)),
            1 => DeclName::NamedTest(NullTerminatedString(name)),
            2 => DeclName::UnnamedTest,
            3 => DeclName::Comptime,
            _ => DeclName::Usingnamespace,
        }
    }
}

const DECL_FLAG_PUB: u32 = 1 << 0;
const DECL_FLAG_EXPORT: u32 = 1 << 1;
const FUNC_FLAG_INFERRED_ERROR_SET: u32 = 1 << 0;

/// Decoded view of a `Declaration` instruction.
#[derive(Copy, Clone, Debug)]
pub struct Declaration<'a> {
    pub name: DeclName,
    pub is_pub: bool,
    pub is_export: bool,
    pub src_hash: ContentHash,
    pub src_node: u32,
    pub body: &'a [u32],
}

impl Declaration<'_> {
    pub fn body_insts(&self) -> impl Iterator<Item = InstIndex> + '_ {
        self.body.iter().copied().map(InstIndex)
    }

    /// The instruction producing the declaration's value.
    pub fn value(&self) -> Option<InstIndex> {
        self.body.last().copied().map(InstIndex)
    }
}

/// Decoded view of a namespace-declaring instruction.
#[derive(Copy, Clone, Debug)]
pub struct Container<'a> {
    pub kind: ContainerKind,
    pub fields_hash: ContentHash,
    pub src_node: u32,
    fields: &'a [u32],
    decls: &'a [u32],
}

impl Container<'_> {
    pub fn fields_len(&self) -> usize {
        self.fields.len() / 2
    }

    /// `(name, type)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (NullTerminatedString, Option<InstIndex>)> + '_ {
        self.fields.chunks_exact(2).map(|pair| {
            (
                NullTerminatedString(pair[0]),
                InstIndex::from_optional(pair[1]),
            )
        })
    }

    pub fn decls(&self) -> impl Iterator<Item = InstIndex> + '_ {
        self.decls.iter().copied().map(InstIndex)
    }

    pub fn decls_len(&self) -> usize {
        self.decls.len()
    }
}

/// Decoded view of a `Func` instruction.
#[derive(Copy, Clone, Debug)]
pub struct Func<'a> {
    pub ret_type: Option<InstIndex>,
    pub inferred_error_set: bool,
    pub src_node: u32,
    pub body: &'a [u32],
}

impl Func<'_> {
    pub fn body_insts(&self) -> impl Iterator<Item = InstIndex> + '_ {
        self.body.iter().copied().map(InstIndex)
    }
}

/// Decoded view of an `ExportValue` instruction.
#[derive(Copy, Clone, Debug)]
pub struct Export {
    pub operand: InstIndex,
    pub name: NullTerminatedString,
    pub linkage: Linkage,
    pub section: Option<NullTerminatedString>,
    pub src_node: u32,
}

/// A compile error reported by lowering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IrCompileError {
    pub message: String,
    pub byte_offset: u32,
}

/// One file's lowered IR.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct LoweredIr {
    pub tags: Vec<InstTag>,
    pub data: Vec<InstData>,
    pub string_bytes: Vec<u8>,
    pub extra: Vec<u32>,
}

/// `extra` slot holding the compile-error payload index.
pub const EXTRA_COMPILE_ERRORS: usize = 0;

/// Number of reserved `extra` words at the start of every file.
pub const EXTRA_RESERVED: usize = 1;

impl LoweredIr {
    pub fn inst_count(&self) -> usize {
        self.tags.len()
    }

    pub fn tag(&self, inst: InstIndex) -> Option<InstTag> {
        self.tags.get(inst.index()).copied()
    }

    pub fn data(&self, inst: InstIndex) -> InstData {
        self.data.get(inst.index()).copied().unwrap_or_default()
    }

    /// The string starting at `s`. Invalid offsets read as empty.
    pub fn string(&self, s: NullTerminatedString) -> &str {
        let start = s.0 as usize;
        let Some(tail) = self.string_bytes.get(start..) else {
            return "";
        };
        let len = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..len]).unwrap_or("")
    }

    fn extra_slice(&self, start: usize, len: usize) -> &[u32] {
        self.extra.get(start..start + len).unwrap_or(&[])
    }

    fn extra_word(&self, index: usize) -> u32 {
        self.extra.get(index).copied().unwrap_or(0)
    }

    pub fn has_compile_errors(&self) -> bool {
        self.extra_word(EXTRA_COMPILE_ERRORS) != 0
    }

    pub fn compile_errors(&self) -> Vec<IrCompileError> {
        let payload = self.extra_word(EXTRA_COMPILE_ERRORS) as usize;
        if payload == 0 {
            return Vec::new();
        }
        let count = self.extra_word(payload) as usize;
        self.extra_slice(payload + 1, count * 2)
            .chunks_exact(2)
            .map(|pair| IrCompileError {
                message: self.string(NullTerminatedString(pair[0])).to_owned(),
                byte_offset: pair[1],
            })
            .collect()
    }

    pub fn int_value(&self, inst: InstIndex) -> Option<i64> {
        if self.tag(inst)? != InstTag::Int {
            return None;
        }
        let data = self.data(inst);
        #[expect(clippy::cast_possible_wrap, reason = "stored as raw bits")]
        let value = ((u64::from(data.b) << 32) | u64::from(data.a)) as i64;
        Some(value)
    }

    pub fn declaration(&self, inst: InstIndex) -> Option<Declaration<'_>> {
        if self.tag(inst)? != InstTag::Declaration {
            return None;
        }
        let p = self.data(inst).a as usize;
        let flags = self.extra_word(p + 2);
        let body_len = self.extra_word(p + 6) as usize;
        Some(Declaration {
            name: DeclName::decode(self.extra_word(p), self.extra_word(p + 1)),
            is_pub: flags & DECL_FLAG_PUB != 0,
            is_export: flags & DECL_FLAG_EXPORT != 0,
            src_hash: ContentHash::from_words(self.extra_word(p + 3), self.extra_word(p + 4)),
            src_node: self.extra_word(p + 5),
            body: self.extra_slice(p + 7, body_len),
        })
    }

    pub fn container(&self, inst: InstIndex) -> Option<Container<'_>> {
        let kind = self.tag(inst)?.container_kind()?;
        let p = self.data(inst).a as usize;
        let fields_len = self.extra_word(p + 3) as usize;
        let decls_len = self.extra_word(p + 4) as usize;
        let fields_start = p + 5;
        let decls_start = fields_start + fields_len * 2;
        Some(Container {
            kind,
            fields_hash: ContentHash::from_words(self.extra_word(p), self.extra_word(p + 1)),
            src_node: self.extra_word(p + 2),
            fields: self.extra_slice(fields_start, fields_len * 2),
            decls: self.extra_slice(decls_start, decls_len),
        })
    }

    pub fn func(&self, inst: InstIndex) -> Option<Func<'_>> {
        if self.tag(inst)? != InstTag::Func {
            return None;
        }
        let p = self.data(inst).a as usize;
        let body_len = self.extra_word(p + 3) as usize;
        Some(Func {
            ret_type: InstIndex::from_optional(self.extra_word(p)),
            inferred_error_set: self.extra_word(p + 1) & FUNC_FLAG_INFERRED_ERROR_SET != 0,
            src_node: self.extra_word(p + 2),
            body: self.extra_slice(p + 4, body_len),
        })
    }

    pub fn export(&self, inst: InstIndex) -> Option<Export> {
        if self.tag(inst)? != InstTag::ExportValue {
            return None;
        }
        let data = self.data(inst);
        let p = data.b as usize;
        let section = self.extra_word(p + 2);
        Some(Export {
            operand: InstIndex(data.a),
            name: NullTerminatedString(self.extra_word(p)),
            linkage: Linkage::from_raw(self.extra_word(p + 1)),
            section: (section != 0).then_some(NullTerminatedString(section)),
            src_node: self.extra_word(p + 3),
        })
    }

    /// Content hash the correlator compares for `inst`.
    ///
    /// Declarations hash their own tokens (excluding nested member
    /// declarations); containers hash their field list.
    pub fn associated_src_hash(&self, inst: InstIndex) -> Option<ContentHash> {
        match self.tag(inst)? {
            InstTag::Declaration => self.declaration(inst).map(|d| d.src_hash),
            tag if tag.is_namespace_decl() => self.container(inst).map(|c| c.fields_hash),
            _ => None,
        }
    }

    /// Syntax node an instruction was lowered from, if it records one.
    pub fn inst_src_node(&self, inst: InstIndex) -> Option<u32> {
        let tag = self.tag(inst)?;
        match tag {
            InstTag::Declaration => self.declaration(inst).map(|d| d.src_node),
            InstTag::Func => self.func(inst).map(|f| f.src_node),
            InstTag::ExportValue => self.export(inst).map(|e| e.src_node),
            InstTag::StructDecl
            | InstTag::UnionDecl
            | InstTag::EnumDecl
            | InstTag::OpaqueDecl => self.container(inst).map(|c| c.src_node),
            InstTag::DeclVal
            | InstTag::DeclRef
            | InstTag::SizeOf
            | InstTag::ErrorValue
            | InstTag::Call
            | InstTag::Return
            | InstTag::CompileError => Some(self.data(inst).b),
            InstTag::Int
            | InstTag::IntType
            | InstTag::PrimType
            | InstTag::PtrType
            | InstTag::Add => None,
        }
    }

    /// Names of the string-named, non-test declarations of a namespace.
    pub fn decl_names(&self, namespace: InstIndex) -> Vec<&str> {
        let Some(container) = self.container(namespace) else {
            return Vec::new();
        };
        container
            .decls()
            .filter_map(|decl| match self.declaration(decl)?.name {
                DeclName::Named(name) => Some(self.string(name)),
                _ => None,
            })
            .collect()
    }

    /// Namespace-declaring instructions nested in a declaration's value, in
    /// discovery order. Nested namespaces' own member declarations are not
    /// entered.
    pub fn find_decls(&self, decl_inst: InstIndex) -> Vec<InstIndex> {
        let mut found = Vec::new();
        if let Some(decl) = self.declaration(decl_inst) {
            for inst in decl.body_insts() {
                self.find_decls_in(inst, &mut found);
            }
        }
        found
    }

    fn find_decls_in(&self, inst: InstIndex, found: &mut Vec<InstIndex>) {
        let Some(tag) = self.tag(inst) else {
            return;
        };
        if tag.is_namespace_decl() {
            found.push(inst);
            if let Some(container) = self.container(inst) {
                for (_, ty) in container.fields() {
                    if let Some(ty) = ty {
                        self.find_decls_in(ty, found);
                    }
                }
            }
            return;
        }
        let data = self.data(inst);
        match tag {
            InstTag::Func => {
                if let Some(func) = self.func(inst) {
                    if let Some(ret) = func.ret_type {
                        self.find_decls_in(ret, found);
                    }
                    for body in func.body_insts() {
                        self.find_decls_in(body, found);
                    }
                }
            }
            InstTag::PtrType | InstTag::SizeOf | InstTag::Call | InstTag::ExportValue => {
                self.find_decls_in(InstIndex(data.a), found);
            }
            InstTag::Return => {
                if let Some(operand) = InstIndex::from_optional(data.a) {
                    self.find_decls_in(operand, found);
                }
            }
            InstTag::Add => {
                self.find_decls_in(InstIndex(data.a), found);
                self.find_decls_in(InstIndex(data.b), found);
            }
            _ => {}
        }
    }
}

impl fmt::Debug for LoweredIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoweredIr")
            .field("instructions", &self.tags.len())
            .field("string_bytes", &self.string_bytes.len())
            .field("extra", &self.extra.len())
            .field("has_compile_errors", &self.has_compile_errors())
            .finish()
    }
}
