//! Comptime evaluation of lowered declarations.
//!
//! Every declaration value is computed at compile time. Function bodies
//! are checked rather than run: calls contribute their callee's errors and
//! `return` operands are checked against the return type.

use kiln_diagnostic::{ErrorCode, LazySrcLoc};
use kiln_intern::{
    ErrorSet, ErrorValue, Field, FuncType, Index, IntType, IntValue, Key, PtrType, Signedness,
    SimpleType,
};
use kiln_ir::{
    ContainerKind, DeclIndex, DeclName, FuncIndex, InstData, InstIndex, InstTag, Name,
    NamespaceIndex, NullTerminatedString, Primitive,
};
use kiln_sema::export::Exported;
use kiln_sema::{AnalysisError, Analyzer, DeclIr, DeclValue, FuncBody, Sema};

/// Evaluates declarations of the reference language.
#[derive(Copy, Clone, Debug, Default)]
pub struct ComptimeAnalyzer;

type EvalResult<T> = Result<T, AnalysisError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Value {
    ty: Index,
    val: Index,
}

impl Value {
    const VOID: Value = Value {
        ty: Index::VOID_TYPE,
        val: Index::VOID_VALUE,
    };

    fn of_type(ty: Index) -> Self {
        Value {
            ty: Index::TYPE_TYPE,
            val: ty,
        }
    }

    /// A value only known at run time; only its type is meaningful.
    fn runtime(ty: Index) -> Self {
        Value {
            ty,
            val: Index::VOID_VALUE,
        }
    }
}

fn unexpected(what: &str) -> AnalysisError {
    AnalysisError::Unexpected(what.to_owned())
}

/// Whether `value` is representable in `int`.
fn fits(value: i64, int: IntType) -> bool {
    let value = i128::from(value);
    let bits = u32::from(int.bits);
    match int.signedness {
        Signedness::Signed if bits == 0 => value == 0,
        Signedness::Signed if bits >= 64 => true,
        Signedness::Signed => {
            let half = 1i128 << (bits - 1);
            (-half..half).contains(&value)
        }
        Signedness::Unsigned if bits >= 64 => value >= 0,
        Signedness::Unsigned => (0..1i128 << bits).contains(&value),
    }
}

/// ABI size in bytes of an integer with `bits` bits.
fn int_size(bits: u32) -> u64 {
    if bits == 0 {
        return 0;
    }
    u64::from(bits).div_ceil(8).next_power_of_two()
}

/// Size of the smallest tag that numbers `count` variants.
fn enum_tag_size(count: usize) -> u64 {
    if count <= 1 {
        return 0;
    }
    int_size(usize::BITS - (count - 1).leading_zeros())
}

/// The error names a function body can return.
struct BodyState {
    ret: Index,
    has_inferred_error_set: bool,
    errors: Vec<Name>,
}

/// Evaluates the instructions of one declaration, function body or
/// container field list.
struct Eval<'d> {
    dir: &'d DeclIr,
    /// Where identifiers are looked up.
    namespace: NamespaceIndex,
    body: Option<BodyState>,
}

impl<'d> Eval<'d> {
    fn new(dir: &'d DeclIr, namespace: NamespaceIndex) -> Self {
        Eval {
            dir,
            namespace,
            body: None,
        }
    }

    fn fail(sema: &mut Sema<'_, '_>, code: ErrorCode, src: LazySrcLoc, message: String) -> AnalysisError {
        sema.fail(code, src, message).into()
    }

    fn key(sema: &Sema<'_, '_>, index: Index) -> EvalResult<Key> {
        sema.db()
            .pool()
            .key(index)
            .map_err(|e| AnalysisError::Unexpected(e.to_string()))
    }

    fn int_of(sema: &Sema<'_, '_>, value: Value) -> Option<i64> {
        match sema.db().pool().key(value.val) {
            Ok(Key::Int(int)) => Some(int.value),
            _ => None,
        }
    }

    fn int_type(sema: &Sema<'_, '_>, ty: Index) -> Option<IntType> {
        match sema.db().pool().key(ty) {
            Ok(Key::IntType(int)) => Some(int),
            _ => None,
        }
    }

    fn int_value(sema: &mut Sema<'_, '_>, ty: Index, value: i64) -> Value {
        let val = sema.intern(Key::Int(IntValue { ty, value }));
        Value { ty, val }
    }

    fn eval(&mut self, sema: &mut Sema<'_, '_>, inst: InstIndex) -> EvalResult<Value> {
        let dir = self.dir;
        let ir = &*dir.ir;
        let Some(tag) = ir.tag(inst) else {
            return Err(unexpected("instruction out of range"));
        };
        let data = ir.data(inst);
        match tag {
            InstTag::Int => {
                let value = ir.int_value(inst).unwrap_or_default();
                Ok(Self::int_value(sema, Index::COMPTIME_INT_TYPE, value))
            }
            InstTag::IntType => {
                let signedness = if data.a != 0 {
                    Signedness::Signed
                } else {
                    Signedness::Unsigned
                };
                let bits = u16::try_from(data.b).unwrap_or(u16::MAX);
                Ok(Value::of_type(sema.intern(Key::IntType(IntType { signedness, bits }))))
            }
            InstTag::PrimType => {
                let ty = match Primitive::from_raw(data.a) {
                    Some(Primitive::Void) => Index::VOID_TYPE,
                    Some(Primitive::Bool) => Index::BOOL_TYPE,
                    Some(Primitive::Type) => Index::TYPE_TYPE,
                    Some(Primitive::ComptimeInt) => Index::COMPTIME_INT_TYPE,
                    Some(Primitive::Noreturn) => Index::NORETURN_TYPE,
                    None => return Err(unexpected("unknown primitive type")),
                };
                Ok(Value::of_type(ty))
            }
            InstTag::PtrType => {
                let child = self.eval_type(sema, InstIndex::new(data.a), dir.loc())?;
                let is_const = data.b != 0;
                Ok(Value::of_type(sema.intern(Key::PtrType(PtrType { child, is_const }))))
            }
            InstTag::DeclVal => {
                let (target, src) = self.resolve(sema, data)?;
                let value = sema.analyze_decl_val(target, src)?;
                Ok(Value {
                    ty: value.ty,
                    val: value.val,
                })
            }
            InstTag::DeclRef => {
                let (target, src) = self.resolve(sema, data)?;
                let val = sema.analyze_decl_ref(target, src)?;
                let ty = Self::key(sema, val)?.type_of();
                Ok(Value { ty, val })
            }
            InstTag::SizeOf => {
                let src = dir.node_loc(data.b);
                let ty = self.eval_type(sema, InstIndex::new(data.a), src)?;
                let size = self.size_of(sema, ty, src, &mut Vec::new())?;
                let size = i64::try_from(size).unwrap_or(i64::MAX);
                Ok(Self::int_value(sema, Index::COMPTIME_INT_TYPE, size))
            }
            InstTag::Add => self.add(sema, InstIndex::new(data.a), InstIndex::new(data.b)),
            InstTag::ErrorValue => {
                let name = sema.names().intern(ir.string(NullTerminatedString(data.a)));
                let ty = sema.intern(Key::ErrorSetType(ErrorSet::new([name])));
                let val = sema.intern(Key::Err(ErrorValue { ty, name }));
                Ok(Value { ty, val })
            }
            InstTag::Func => self.func(sema, inst),
            InstTag::Call => self.call(sema, data),
            InstTag::Return => self.ret(sema, data),
            InstTag::ExportValue => self.export(sema, inst),
            InstTag::CompileError => {
                let message = ir.string(NullTerminatedString(data.a)).to_owned();
                Err(Self::fail(sema, ErrorCode::E1005, dir.node_loc(data.b), message))
            }
            InstTag::StructDecl | InstTag::UnionDecl | InstTag::EnumDecl | InstTag::OpaqueDecl => {
                let src = ir
                    .inst_src_node(inst)
                    .map_or_else(|| dir.loc(), |node| dir.node_loc(node));
                let ty = sema.create_container_type(dir.file, inst, Some(self.namespace), src)?;
                Ok(Value::of_type(ty))
            }
            InstTag::Declaration => Err(unexpected("declaration used as a value")),
        }
    }

    /// Evaluate `inst` and require a type.
    fn eval_type(&mut self, sema: &mut Sema<'_, '_>, inst: InstIndex, src: LazySrcLoc) -> EvalResult<Index> {
        let value = self.eval(sema, inst)?;
        if value.ty != Index::TYPE_TYPE {
            let found = sema.format_value(value.val);
            return Err(Self::fail(sema, ErrorCode::E1003, src, format!("expected type, found '{found}'")));
        }
        Ok(value.val)
    }

    /// The declaration an identifier names.
    fn resolve(&mut self, sema: &mut Sema<'_, '_>, data: InstData) -> EvalResult<(DeclIndex, LazySrcLoc)> {
        let dir = self.dir;
        let text = dir.ir.string(NullTerminatedString(data.a));
        let name = sema.names().intern(text);
        let src = dir.node_loc(data.b);
        match sema.lookup_name(self.namespace, name, src)? {
            Some(decl) => Ok((decl, src)),
            None => Err(Self::fail(
                sema,
                ErrorCode::E1001,
                src,
                format!("use of undeclared identifier '{text}'"),
            )),
        }
    }

    /// Convert `value` to `target`, checking integer ranges.
    fn coerce(&mut self, sema: &mut Sema<'_, '_>, value: Value, target: Index, src: LazySrcLoc) -> EvalResult<Value> {
        if value.ty == target {
            return Ok(value);
        }
        if value.ty == Index::COMPTIME_INT_TYPE {
            if let (Some(int), Some(n)) = (Self::int_type(sema, target), Self::int_of(sema, value)) {
                if !fits(n, int) {
                    let ty = sema.format_value(target);
                    return Err(Self::fail(
                        sema,
                        ErrorCode::E1006,
                        src,
                        format!("type '{ty}' cannot represent integer value '{n}'"),
                    ));
                }
                return Ok(Self::int_value(sema, target, n));
            }
        }
        let (expected, found) = (sema.format_value(target), sema.format_value(value.ty));
        Err(Self::fail(
            sema,
            ErrorCode::E1003,
            src,
            format!("expected type '{expected}', found '{found}'"),
        ))
    }

    fn add(&mut self, sema: &mut Sema<'_, '_>, lhs: InstIndex, rhs: InstIndex) -> EvalResult<Value> {
        let src = self.dir.loc();
        let lhs = self.eval(sema, lhs)?;
        let rhs = self.eval(sema, rhs)?;
        let (Some(a), Some(b)) = (Self::int_of(sema, lhs), Self::int_of(sema, rhs)) else {
            let (l, r) = (sema.format_value(lhs.ty), sema.format_value(rhs.ty));
            return Err(Self::fail(
                sema,
                ErrorCode::E1003,
                src,
                format!("invalid operands to '+': '{l}' and '{r}'"),
            ));
        };
        let ty = if lhs.ty == rhs.ty || rhs.ty == Index::COMPTIME_INT_TYPE {
            lhs.ty
        } else if lhs.ty == Index::COMPTIME_INT_TYPE {
            rhs.ty
        } else {
            let (l, r) = (sema.format_value(lhs.ty), sema.format_value(rhs.ty));
            return Err(Self::fail(
                sema,
                ErrorCode::E1003,
                src,
                format!("incompatible types: '{l}' and '{r}'"),
            ));
        };
        let sum = a
            .checked_add(b)
            .filter(|&sum| Self::int_type(sema, ty).map_or(true, |int| fits(sum, int)));
        match sum {
            Some(sum) => Ok(Self::int_value(sema, ty, sum)),
            None => {
                let rendered = sema.format_value(ty);
                Err(Self::fail(
                    sema,
                    ErrorCode::E1006,
                    src,
                    format!("overflow of integer type '{rendered}'"),
                ))
            }
        }
    }

    /// Size in bytes of `ty`. `visiting` holds the containers whose size is
    /// being computed, to reject types that contain themselves.
    fn size_of(
        &mut self,
        sema: &mut Sema<'_, '_>,
        ty: Index,
        src: LazySrcLoc,
        visiting: &mut Vec<Index>,
    ) -> EvalResult<u64> {
        match Self::key(sema, ty)? {
            Key::SimpleType(SimpleType::Void) => Ok(0),
            Key::SimpleType(SimpleType::Bool) => Ok(1),
            Key::SimpleType(SimpleType::AnyError) | Key::ErrorSetType(_) => Ok(2),
            Key::IntType(int) => Ok(int_size(u32::from(int.bits))),
            Key::PtrType(_) => Ok(8),
            Key::ContainerType(key) => {
                let rendered = sema.format_value(ty);
                if visiting.contains(&ty) {
                    return Err(Self::fail(
                        sema,
                        ErrorCode::E1002,
                        src,
                        format!("dependency loop detected: type '{rendered}' contains itself"),
                    ));
                }
                if key.kind == ContainerKind::Opaque {
                    return Err(Self::fail(
                        sema,
                        ErrorCode::E1003,
                        src,
                        format!("size of opaque type '{rendered}' is unknown"),
                    ));
                }
                sema.resolve_type_fields(ty, src)?;
                let fields = sema
                    .db()
                    .pool()
                    .container(ty)
                    .map(|c| c.fields.clone())
                    .map_err(|e| AnalysisError::Unexpected(e.to_string()))?;
                if key.kind == ContainerKind::Enum {
                    return Ok(enum_tag_size(fields.len()));
                }
                visiting.push(ty);
                let mut sizes = Vec::with_capacity(fields.len());
                for field in fields {
                    sizes.push(self.size_of(sema, field.ty, src, visiting)?);
                }
                visiting.pop();
                Ok(match key.kind {
                    ContainerKind::Union => sizes.into_iter().max().unwrap_or(0),
                    _ => sizes.into_iter().sum(),
                })
            }
            _ => {
                let rendered = sema.format_value(ty);
                Err(Self::fail(
                    sema,
                    ErrorCode::E1003,
                    src,
                    format!("type '{rendered}' has no runtime size"),
                ))
            }
        }
    }

    fn func(&mut self, sema: &mut Sema<'_, '_>, inst: InstIndex) -> EvalResult<Value> {
        if self.body.is_some() {
            return Err(unexpected("function declared inside a function body"));
        }
        let dir = self.dir;
        let Some(func) = dir.ir.func(inst) else {
            return Err(unexpected("not a function instruction"));
        };
        let (ret_type, inferred_error_set) = (func.ret_type, func.inferred_error_set);
        let ret = match ret_type {
            Some(ret) => self.eval_type(sema, ret, dir.loc())?,
            None => Index::VOID_TYPE,
        };
        let ty = sema.intern(Key::FuncType(FuncType {
            params: Box::default(),
            ret,
            inferred_error_set,
        }));
        // Bodies are tracked through their declaration, which keeps its
        // identity across edits.
        let (_, val) = sema.get_or_create_func(dir.tracked, ty);
        Ok(Value { ty, val })
    }

    fn call(&mut self, sema: &mut Sema<'_, '_>, data: InstData) -> EvalResult<Value> {
        let src = self.dir.node_loc(data.b);
        if self.body.is_none() {
            return Err(Self::fail(
                sema,
                ErrorCode::E1007,
                src,
                "unable to analyze: function calls cannot be evaluated at compile time".to_owned(),
            ));
        }
        let callee = self.eval(sema, InstIndex::new(data.a))?;
        let func = match Self::key(sema, callee.val)? {
            Key::Func(func) => func,
            _ => {
                let ty = sema.format_value(callee.ty);
                return Err(Self::fail(
                    sema,
                    ErrorCode::E1010,
                    src,
                    format!("type '{ty}' is not a function"),
                ));
            }
        };
        let Key::FuncType(func_ty) = Self::key(sema, func.ty)? else {
            return Err(unexpected("function value without a function type"));
        };
        if func_ty.inferred_error_set {
            let ies = sema.resolve_inferred_error_set(func.func, src)?;
            if let (Key::ErrorSetType(set), Some(body)) = (Self::key(sema, ies)?, self.body.as_mut()) {
                body.errors.extend_from_slice(set.names());
            }
        }
        Ok(Value::runtime(func_ty.ret))
    }

    fn ret(&mut self, sema: &mut Sema<'_, '_>, data: InstData) -> EvalResult<Value> {
        let src = self.dir.node_loc(data.b);
        let Some((ret, has_ies)) = self.body.as_ref().map(|b| (b.ret, b.has_inferred_error_set)) else {
            return Err(unexpected("return outside of a function body"));
        };
        let value = if data.a == u32::MAX {
            Value::VOID
        } else {
            self.eval(sema, InstIndex::new(data.a))?
        };
        if let Key::Err(err) = Self::key(sema, value.val)? {
            if has_ies {
                if let Some(body) = self.body.as_mut() {
                    body.errors.push(err.name);
                }
                return Ok(Value::VOID);
            }
        }
        self.coerce(sema, value, ret, src)?;
        Ok(Value::VOID)
    }

    fn export(&mut self, sema: &mut Sema<'_, '_>, inst: InstIndex) -> EvalResult<Value> {
        let dir = self.dir;
        let ir = &*dir.ir;
        let Some(export) = ir.export(inst) else {
            return Err(unexpected("not an export instruction"));
        };
        let src = dir.node_loc(export.src_node);
        let exported = if ir.tag(export.operand) == Some(InstTag::DeclVal) {
            let (target, target_src) = self.resolve(sema, ir.data(export.operand))?;
            sema.analyze_decl_val(target, target_src)?;
            Exported::Decl(target)
        } else {
            Exported::Value(self.eval(sema, export.operand)?.val)
        };
        let name = ir.string(export.name);
        let section = export.section.map(|s| ir.string(s));
        sema.export(exported, name, export.linkage, section, src)?;
        Ok(Value::VOID)
    }
}

impl Analyzer for ComptimeAnalyzer {
    #[tracing::instrument(level = "trace", skip(self, sema))]
    fn analyze_decl(&self, sema: &mut Sema<'_, '_>, decl: DeclIndex) -> Result<DeclValue, AnalysisError> {
        let dir = sema
            .decl_ir(decl)
            .ok_or_else(|| unexpected("declaration has no IR"))?;
        let namespace = sema
            .decl(decl)
            .src_namespace
            .ok_or_else(|| unexpected("declaration has no namespace"))?;
        let declaration = dir
            .ir
            .declaration(dir.inst)
            .ok_or_else(|| unexpected("not a declaration instruction"))?;
        let name = declaration.name;
        let body: Vec<InstIndex> = declaration.body_insts().collect();

        let mut eval = Eval::new(&dir, namespace);
        let value = match (name, body.as_slice()) {
            (DeclName::Comptime, _) => {
                for &inst in &body {
                    eval.eval(sema, inst)?;
                }
                Value::VOID
            }
            (DeclName::Usingnamespace, &[target]) => {
                let value = eval.eval(sema, target)?;
                let is_container = value.ty == Index::TYPE_TYPE
                    && sema.db().pool().container(value.val).is_ok();
                if !is_container {
                    let found = sema.format_value(value.val);
                    return Err(Eval::fail(
                        sema,
                        ErrorCode::E1008,
                        dir.loc(),
                        format!("usingnamespace operand must be a container type, found '{found}'"),
                    ));
                }
                value
            }
            (_, &[value]) => eval.eval(sema, value)?,
            (_, &[ty, value]) => {
                let ty = eval.eval_type(sema, ty, dir.loc())?;
                let value = eval.eval(sema, value)?;
                eval.coerce(sema, value, ty, dir.loc())?
            }
            _ => return Err(unexpected("malformed declaration body")),
        };
        tracing::trace!(value = %sema.format_value(value.val), "evaluated");
        Ok(DeclValue::new(value.ty, value.val))
    }

    #[tracing::instrument(level = "trace", skip(self, sema))]
    fn analyze_func_body(&self, sema: &mut Sema<'_, '_>, func: FuncIndex) -> Result<FuncBody, AnalysisError> {
        let dir = sema
            .func_ir(func)
            .ok_or_else(|| unexpected("function has no IR"))?;
        let f = sema.db().func(func);
        let (owner, ty) = (f.owner_decl, f.ty);
        let namespace = sema
            .decl(owner)
            .src_namespace
            .ok_or_else(|| unexpected("function owner has no namespace"))?;
        let Key::FuncType(func_ty) = Eval::key(sema, ty)? else {
            return Err(unexpected("function without a function type"));
        };
        let stmts: Vec<InstIndex> = dir
            .ir
            .declaration(dir.inst)
            .and_then(|d| d.value())
            .and_then(|value| dir.ir.func(value))
            .ok_or_else(|| unexpected("declaration does not hold a function"))?
            .body_insts()
            .collect();

        let mut eval = Eval::new(&dir, namespace);
        eval.body = Some(BodyState {
            ret: func_ty.ret,
            has_inferred_error_set: func_ty.inferred_error_set,
            errors: Vec::new(),
        });
        for stmt in stmts {
            eval.eval(sema, stmt)?;
        }
        let errors = eval.body.map(|b| b.errors).unwrap_or_default();
        Ok(FuncBody { errors })
    }

    #[tracing::instrument(level = "trace", skip(self, sema))]
    fn resolve_container_fields(&self, sema: &mut Sema<'_, '_>, ty: Index) -> Result<Vec<Field>, AnalysisError> {
        let (key, namespace) = sema
            .db()
            .pool()
            .container(ty)
            .map(|c| (c.key, c.namespace))
            .map_err(|e| AnalysisError::Unexpected(e.to_string()))?;
        let (file, inst) = sema
            .db()
            .tracked()
            .resolve(key.zir_index)
            .ok_or_else(|| unexpected("container instruction was lost"))?;
        let ir = sema
            .db()
            .files()
            .file(file)
            .analysis_ir()
            .cloned()
            .ok_or_else(|| unexpected("container file has no IR"))?;
        let dir = DeclIr {
            file,
            ir,
            inst,
            tracked: key.zir_index,
        };
        let fields: Vec<_> = dir
            .ir
            .container(inst)
            .ok_or_else(|| unexpected("not a container instruction"))?
            .fields()
            .collect();

        let mut eval = Eval::new(&dir, namespace);
        let mut resolved = Vec::with_capacity(fields.len());
        for (name, field_ty) in fields {
            let ty = match field_ty {
                Some(inst) => eval.eval_type(sema, inst, dir.loc())?,
                // Enum fields are values of the enum.
                None => ty,
            };
            let name = sema.names().intern(dir.ir.string(name));
            resolved.push(Field { name, ty });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int(signedness: Signedness, bits: u16) -> IntType {
        IntType { signedness, bits }
    }

    #[test]
    fn integer_ranges() {
        assert!(fits(127, int(Signedness::Signed, 8)));
        assert!(!fits(128, int(Signedness::Signed, 8)));
        assert!(fits(-128, int(Signedness::Signed, 8)));
        assert!(!fits(-129, int(Signedness::Signed, 8)));
        assert!(fits(255, int(Signedness::Unsigned, 8)));
        assert!(!fits(256, int(Signedness::Unsigned, 8)));
        assert!(!fits(-1, int(Signedness::Unsigned, 64)));
        assert!(fits(i64::MAX, int(Signedness::Unsigned, 64)));
        assert!(fits(0, int(Signedness::Signed, 0)));
        assert!(!fits(1, int(Signedness::Unsigned, 0)));
    }

    #[test]
    fn sizes_round_to_powers_of_two() {
        assert_eq!(int_size(0), 0);
        assert_eq!(int_size(1), 1);
        assert_eq!(int_size(8), 1);
        assert_eq!(int_size(9), 2);
        assert_eq!(int_size(24), 4);
        assert_eq!(int_size(64), 8);
        assert_eq!(enum_tag_size(1), 0);
        assert_eq!(enum_tag_size(2), 1);
        assert_eq!(enum_tag_size(256), 1);
        assert_eq!(enum_tag_size(257), 2);
    }
}
