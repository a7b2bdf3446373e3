//! Lowering a [`SourceFile`] into [`LoweredIr`].
//!
//! Problems that parse but cannot be lowered are recorded as compile errors
//! in the IR, at the byte offset of the offending expression. Lowering
//! carries on after an error with a placeholder instruction so every error
//! in the file is reported at once.

use crate::ast::{ContainerAst, Expr, ExprId, ExprKind, FieldAst, Member, MemberName, MemberValue, Stmt};
use crate::parser::SourceFile;
use kiln_ir::lowered::{ContainerSpec, DeclSpec, ExportSpec, FuncSpec};
use kiln_ir::{
    ContainerKind, DeclName, InstIndex, InstTag, IrBuilder, Linkage, LoweredIr,
    NullTerminatedString, Primitive, Span,
};

pub fn lower(file: &SourceFile) -> LoweredIr {
    let mut gen = AstGen {
        file,
        b: IrBuilder::new(),
    };
    let root = &file.root;
    let (fields, decls) = gen.container_parts(root);
    gen.b.set_main_struct(&ContainerSpec {
        kind: root.kind,
        fields_hash: root.fields_hash,
        src_node: root.node,
        fields: &fields,
        decls: &decls,
    });
    gen.b.finish()
}

/// `iN`/`uN` as `(signed, bits)`. `Err` if the width is out of range.
fn int_type_bits(name: &str) -> Option<Result<(bool, u16), ()>> {
    let signed = match name.as_bytes().first()? {
        b'i' => true,
        b'u' => false,
        _ => return None,
    };
    let digits = &name[1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse::<u16>().map(|bits| (signed, bits)).map_err(|_| ()))
}

fn parse_int(text: &str) -> Option<i64> {
    text.replace('_', "").parse().ok()
}

struct AstGen<'a> {
    file: &'a SourceFile,
    b: IrBuilder,
}

impl AstGen<'_> {
    fn error(&mut self, span: Span, message: &str) {
        self.b.add_compile_error(message, span.start);
    }

    /// Stands in for an expression that failed to lower.
    fn placeholder(&mut self) -> InstIndex {
        self.b.add_prim(Primitive::Void)
    }

    fn node_span(&self, node: u32) -> Span {
        self.file.tree.node_span(node).unwrap_or_default()
    }

    fn container_parts(
        &mut self,
        container: &ContainerAst,
    ) -> (Vec<(NullTerminatedString, Option<InstIndex>)>, Vec<InstIndex>) {
        let mut fields = Vec::with_capacity(container.fields.len());
        for field in &container.fields {
            fields.push(self.field(container.kind, field));
        }
        let decls = container.members.iter().map(|m| self.member(m)).collect();
        (fields, decls)
    }

    fn field(
        &mut self,
        kind: ContainerKind,
        field: &FieldAst,
    ) -> (NullTerminatedString, Option<InstIndex>) {
        let ty = field.ty.map(|ty| self.expr(ty));
        match (kind, ty) {
            (ContainerKind::Struct | ContainerKind::Union, None) => {
                let message = format!("{} field '{}' needs a type", kind.keyword(), field.name);
                self.error(field.span, &message);
            }
            (ContainerKind::Enum, Some(_)) => {
                self.error(field.span, "enum fields cannot have types");
            }
            (ContainerKind::Opaque, _) => {
                self.error(field.span, "opaque types cannot have fields");
            }
            _ => {}
        }
        (self.b.string(&field.name), ty)
    }

    fn member(&mut self, member: &Member) -> InstIndex {
        let name = match &member.name {
            MemberName::Named(name) => DeclName::Named(self.b.string(name)),
            MemberName::Test(Some(name)) => DeclName::NamedTest(self.b.string(name)),
            MemberName::Test(None) => DeclName::UnnamedTest,
            MemberName::Comptime => DeclName::Comptime,
            MemberName::Usingnamespace => DeclName::Usingnamespace,
        };
        let body = match &member.value {
            MemberValue::Const { ty, value } => {
                let mut body = Vec::with_capacity(2);
                if let Some(ty) = ty {
                    body.push(self.expr(*ty));
                }
                body.push(self.expr(*value));
                body
            }
            MemberValue::Func(func) => {
                let ret = self.expr(func.ret);
                vec![self.func(Some(ret), func.inferred_error_set, &func.body, member.node)]
            }
            MemberValue::Block(stmts) if matches!(member.name, MemberName::Test(_)) => {
                vec![self.func(None, true, stmts, member.node)]
            }
            MemberValue::Block(stmts) => stmts.iter().map(|s| self.stmt(s, false)).collect(),
            MemberValue::Using(target) => vec![self.expr(*target)],
        };
        self.b.add_declaration(&DeclSpec {
            name,
            is_pub: member.is_pub,
            is_export: member.is_export,
            src_hash: member.src_hash,
            src_node: member.node,
            body: &body,
        })
    }

    fn func(
        &mut self,
        ret_type: Option<InstIndex>,
        inferred_error_set: bool,
        stmts: &[Stmt],
        node: u32,
    ) -> InstIndex {
        let body: Vec<InstIndex> = stmts.iter().map(|s| self.stmt(s, true)).collect();
        self.b.add_func(&FuncSpec {
            ret_type,
            inferred_error_set,
            src_node: node,
            body: &body,
        })
    }

    fn stmt(&mut self, stmt: &Stmt, in_func: bool) -> InstIndex {
        match stmt {
            Stmt::Return { value, node } => {
                if !in_func {
                    let span = self.node_span(*node);
                    self.error(span, "'return' outside of a function body");
                }
                let operand = value.map(|v| self.expr(v));
                self.b.add_return(operand, *node)
            }
            Stmt::Expr(expr) => self.expr(*expr),
        }
    }

    fn expr(&mut self, id: ExprId) -> InstIndex {
        let file = self.file;
        let expr = file.arena.get(id);
        let node = expr.node;
        match &expr.kind {
            ExprKind::Int(text) => match parse_int(text) {
                Some(value) => self.b.add_int(value),
                None => {
                    self.error(expr.span, &format!("integer literal '{text}' is too large"));
                    self.placeholder()
                }
            },
            ExprKind::Str(_) => {
                self.error(
                    expr.span,
                    "string literals are only allowed as builtin arguments",
                );
                self.placeholder()
            }
            ExprKind::Ident(name) => self.ident(name, expr),
            ExprKind::AddrOf(name) => {
                let name = self.b.string(name);
                self.b.add_with_node(InstTag::DeclRef, name.0, node)
            }
            ExprKind::PtrType { is_const, child } => {
                let child = self.expr(*child);
                self.b.add_ptr_type(child, *is_const)
            }
            ExprKind::ErrorValue(name) => {
                let name = self.b.string(name);
                self.b.add_with_node(InstTag::ErrorValue, name.0, node)
            }
            ExprKind::Builtin { name, args } => self.builtin(name, args, expr),
            ExprKind::Call(callee) => {
                let callee = self.expr(*callee);
                self.b.add_with_node(InstTag::Call, callee.raw(), node)
            }
            ExprKind::Add(lhs, rhs) => {
                let lhs = self.expr(*lhs);
                let rhs = self.expr(*rhs);
                self.b.add_binary(InstTag::Add, lhs, rhs)
            }
            ExprKind::Container(container) => {
                let (fields, decls) = self.container_parts(container);
                self.b.add_container(&ContainerSpec {
                    kind: container.kind,
                    fields_hash: container.fields_hash,
                    src_node: container.node,
                    fields: &fields,
                    decls: &decls,
                })
            }
        }
    }

    fn ident(&mut self, name: &str, expr: &Expr) -> InstIndex {
        if let Some(prim) = Primitive::from_keyword(name) {
            return self.b.add_prim(prim);
        }
        match name {
            "usize" => return self.b.add_int_type(false, 64),
            "isize" => return self.b.add_int_type(true, 64),
            _ => {}
        }
        match int_type_bits(name) {
            Some(Ok((signed, bits))) => self.b.add_int_type(signed, bits),
            Some(Err(())) => {
                self.error(expr.span, &format!("type '{name}' exceeds the maximum bit width"));
                self.placeholder()
            }
            None => {
                let name = self.b.string(name);
                self.b.add_with_node(InstTag::DeclVal, name.0, expr.node)
            }
        }
    }

    fn builtin(&mut self, name: &str, args: &[ExprId], expr: &Expr) -> InstIndex {
        let node = expr.node;
        match name {
            "sizeOf" if self.arity(expr, args, 1, 1) => {
                let operand = self.expr(args[0]);
                self.b.add_with_node(InstTag::SizeOf, operand.raw(), node)
            }
            "compileError" if self.arity(expr, args, 1, 1) => match self.string_arg(args[0]) {
                Some(message) => self.b.add_with_node(InstTag::CompileError, message.0, node),
                None => self.placeholder(),
            },
            "export" if self.arity(expr, args, 2, 3) => {
                let operand = self.expr(args[0]);
                let symbol = self.string_arg(args[1]);
                let section = match args.get(2) {
                    Some(&arg) => self.string_arg(arg),
                    None => None,
                };
                match symbol {
                    Some(symbol) => self.b.add_export(&ExportSpec {
                        operand,
                        name: symbol,
                        linkage: Linkage::Strong,
                        section,
                        src_node: node,
                    }),
                    None => self.placeholder(),
                }
            }
            "sizeOf" | "compileError" | "export" => self.placeholder(),
            _ => {
                self.error(expr.span, &format!("invalid builtin function: '@{name}'"));
                self.placeholder()
            }
        }
    }

    /// Check the argument count, reporting a mismatch.
    fn arity(&mut self, expr: &Expr, args: &[ExprId], min: usize, max: usize) -> bool {
        if (min..=max).contains(&args.len()) {
            return true;
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        let message = format!("expected {expected} argument(s), found {}", args.len());
        self.error(expr.span, &message);
        false
    }

    fn string_arg(&mut self, id: ExprId) -> Option<NullTerminatedString> {
        let file = self.file;
        let expr = file.arena.get(id);
        if let ExprKind::Str(text) = &expr.kind {
            return Some(self.b.string(text));
        }
        self.error(expr.span, "expected a string literal");
        None
    }
}

#[cfg(test)]
mod tests;
