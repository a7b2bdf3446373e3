//! Incremental construction of `LoweredIr`.
//!
//! Operands must be added before the instructions that reference them.
//! The main struct is reserved at construction and filled in last with
//! `set_main_struct`.

use super::{
    ContainerKind, DeclName, InstData, InstIndex, InstTag, Linkage, LoweredIr,
    NullTerminatedString, Primitive, DECL_FLAG_EXPORT, DECL_FLAG_PUB, EXTRA_COMPILE_ERRORS,
    EXTRA_RESERVED, FUNC_FLAG_INFERRED_ERROR_SET,
};
use crate::ContentHash;
use rustc_hash::FxHashMap;

/// A declaration to append.
#[derive(Clone, Debug)]
pub struct DeclSpec<'a> {
    pub name: DeclName,
    pub is_pub: bool,
    pub is_export: bool,
    pub src_hash: ContentHash,
    pub src_node: u32,
    pub body: &'a [InstIndex],
}

/// A namespace-declaring instruction to append.
#[derive(Clone, Debug)]
pub struct ContainerSpec<'a> {
    pub kind: ContainerKind,
    pub fields_hash: ContentHash,
    pub src_node: u32,
    pub fields: &'a [(NullTerminatedString, Option<InstIndex>)],
    pub decls: &'a [InstIndex],
}

/// A function to append.
#[derive(Clone, Debug)]
pub struct FuncSpec<'a> {
    pub ret_type: Option<InstIndex>,
    pub inferred_error_set: bool,
    pub src_node: u32,
    pub body: &'a [InstIndex],
}

/// An `@export` to append.
#[derive(Clone, Debug)]
pub struct ExportSpec {
    pub operand: InstIndex,
    pub name: NullTerminatedString,
    pub linkage: Linkage,
    pub section: Option<NullTerminatedString>,
    pub src_node: u32,
}

/// Builder for one file's lowered IR.
pub struct IrBuilder {
    ir: LoweredIr,
    strings: FxHashMap<String, NullTerminatedString>,
    errors: Vec<(NullTerminatedString, u32)>,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("lowered IR array exceeds u32 range: {len}"))
}

impl IrBuilder {
    pub fn new() -> Self {
        let mut ir = LoweredIr::default();
        ir.tags.push(InstTag::StructDecl);
        ir.data.push(InstData::default());
        ir.string_bytes.push(0);
        ir.extra.resize(EXTRA_RESERVED, 0);
        IrBuilder {
            ir,
            strings: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    /// Intern `s` into `string_bytes`.
    pub fn string(&mut self, s: &str) -> NullTerminatedString {
        if s.is_empty() {
            return NullTerminatedString::EMPTY;
        }
        if let Some(&existing) = self.strings.get(s) {
            return existing;
        }
        let offset = NullTerminatedString(len_u32(self.ir.string_bytes.len()));
        self.ir.string_bytes.extend_from_slice(s.as_bytes());
        self.ir.string_bytes.push(0);
        self.strings.insert(s.to_owned(), offset);
        offset
    }

    pub fn add(&mut self, tag: InstTag, data: InstData) -> InstIndex {
        let inst = InstIndex(len_u32(self.ir.tags.len()));
        self.ir.tags.push(tag);
        self.ir.data.push(data);
        inst
    }

    fn extra_start(&self) -> u32 {
        len_u32(self.ir.extra.len())
    }

    pub fn add_int(&mut self, value: i64) -> InstIndex {
        #[expect(clippy::cast_sign_loss, reason = "stored as raw bits")]
        let bits = value as u64;
        #[expect(clippy::cast_possible_truncation, reason = "splitting into words")]
        let data = InstData {
            a: bits as u32,
            b: (bits >> 32) as u32,
        };
        self.add(InstTag::Int, data)
    }

    pub fn add_int_type(&mut self, signed: bool, bits: u16) -> InstIndex {
        let data = InstData {
            a: u32::from(signed),
            b: u32::from(bits),
        };
        self.add(InstTag::IntType, data)
    }

    pub fn add_prim(&mut self, prim: Primitive) -> InstIndex {
        let data = InstData {
            a: prim as u32,
            b: 0,
        };
        self.add(InstTag::PrimType, data)
    }

    pub fn add_ptr_type(&mut self, child: InstIndex, is_const: bool) -> InstIndex {
        let data = InstData {
            a: child.0,
            b: u32::from(is_const),
        };
        self.add(InstTag::PtrType, data)
    }

    /// Instructions whose operands are a string or inst plus a src node.
    pub fn add_with_node(&mut self, tag: InstTag, a: u32, src_node: u32) -> InstIndex {
        self.add(tag, InstData { a, b: src_node })
    }

    pub fn add_return(&mut self, operand: Option<InstIndex>, src_node: u32) -> InstIndex {
        let a = InstIndex::to_optional(operand);
        self.add(InstTag::Return, InstData { a, b: src_node })
    }

    pub fn add_binary(&mut self, tag: InstTag, lhs: InstIndex, rhs: InstIndex) -> InstIndex {
        self.add(tag, InstData { a: lhs.0, b: rhs.0 })
    }

    pub fn add_export(&mut self, spec: &ExportSpec) -> InstIndex {
        let payload = self.extra_start();
        self.ir.extra.extend_from_slice(&[
            spec.name.0,
            spec.linkage as u32,
            spec.section.map_or(0, |s| s.0),
            spec.src_node,
        ]);
        let data = InstData {
            a: spec.operand.0,
            b: payload,
        };
        self.add(InstTag::ExportValue, data)
    }

    pub fn add_func(&mut self, spec: &FuncSpec<'_>) -> InstIndex {
        let payload = self.extra_start();
        let flags = if spec.inferred_error_set {
            FUNC_FLAG_INFERRED_ERROR_SET
        } else {
            0
        };
        self.ir.extra.extend_from_slice(&[
            InstIndex::to_optional(spec.ret_type),
            flags,
            spec.src_node,
            len_u32(spec.body.len()),
        ]);
        self.ir.extra.extend(spec.body.iter().map(|inst| inst.0));
        self.add(InstTag::Func, InstData { a: payload, b: 0 })
    }

    pub fn add_declaration(&mut self, spec: &DeclSpec<'_>) -> InstIndex {
        let payload = self.extra_start();
        let mut flags = 0;
        if spec.is_pub {
            flags |= DECL_FLAG_PUB;
        }
        if spec.is_export {
            flags |= DECL_FLAG_EXPORT;
        }
        let [name_kind, name] = spec.name.encode();
        let [hash_lo, hash_hi] = spec.src_hash.to_words();
        self.ir.extra.extend_from_slice(&[
            name_kind,
            name,
            flags,
            hash_lo,
            hash_hi,
            spec.src_node,
            len_u32(spec.body.len()),
        ]);
        self.ir.extra.extend(spec.body.iter().map(|inst| inst.0));
        self.add(InstTag::Declaration, InstData { a: payload, b: 0 })
    }

    fn container_payload(&mut self, spec: &ContainerSpec<'_>) -> u32 {
        let payload = self.extra_start();
        let [hash_lo, hash_hi] = spec.fields_hash.to_words();
        self.ir.extra.extend_from_slice(&[
            hash_lo,
            hash_hi,
            spec.src_node,
            len_u32(spec.fields.len()),
            len_u32(spec.decls.len()),
        ]);
        for (name, ty) in spec.fields {
            self.ir.extra.push(name.0);
            self.ir.extra.push(InstIndex::to_optional(*ty));
        }
        self.ir.extra.extend(spec.decls.iter().map(|inst| inst.0));
        payload
    }

    pub fn add_container(&mut self, spec: &ContainerSpec<'_>) -> InstIndex {
        let payload = self.container_payload(spec);
        self.add(spec.kind.tag(), InstData { a: payload, b: 0 })
    }

    /// Fill in instruction 0.
    pub fn set_main_struct(&mut self, spec: &ContainerSpec<'_>) {
        let payload = self.container_payload(spec);
        self.ir.tags[InstIndex::MAIN_STRUCT.index()] = spec.kind.tag();
        self.ir.data[InstIndex::MAIN_STRUCT.index()] = InstData { a: payload, b: 0 };
    }

    /// Record a file-level compile error at `byte_offset`.
    pub fn add_compile_error(&mut self, message: &str, byte_offset: u32) {
        let message = self.string(message);
        self.errors.push((message, byte_offset));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(mut self) -> LoweredIr {
        if !self.errors.is_empty() {
            let payload = self.extra_start();
            self.ir.extra.push(len_u32(self.errors.len()));
            for (message, offset) in &self.errors {
                self.ir.extra.push(message.0);
                self.ir.extra.push(*offset);
            }
            self.ir.extra[EXTRA_COMPILE_ERRORS] = payload;
        }
        self.ir
    }
}
