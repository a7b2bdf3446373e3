//! Human-readable rendering of types and values for diagnostics.

use super::InternPool;
use crate::key::{Key, Signedness, SimpleType, SimpleValue};
use crate::Index;
use kiln_ir::{DeclIndex, StringInterner};
use std::fmt::Write;

impl InternPool {
    /// Render `index` for an error message.
    ///
    /// `decl_name` names the owner declaration of container types.
    pub fn format(
        &self,
        index: Index,
        names: &StringInterner,
        decl_name: &dyn Fn(DeclIndex) -> String,
    ) -> String {
        let mut buf = String::new();
        self.format_into(index, names, decl_name, &mut buf);
        buf
    }

    fn format_into(
        &self,
        index: Index,
        names: &StringInterner,
        decl_name: &dyn Fn(DeclIndex) -> String,
        buf: &mut String,
    ) {
        let key = match self.key(index) {
            Ok(key) => key,
            Err(_) => {
                buf.push_str("<removed>");
                return;
            }
        };
        match key {
            Key::SimpleType(simple) => buf.push_str(match simple {
                SimpleType::Void => "void",
                SimpleType::Bool => "bool",
                SimpleType::Type => "type",
                SimpleType::ComptimeInt => "comptime_int",
                SimpleType::Noreturn => "noreturn",
                SimpleType::AnyError => "anyerror",
            }),
            Key::IntType(int) => {
                let sign = match int.signedness {
                    Signedness::Signed => 'i',
                    Signedness::Unsigned => 'u',
                };
                let _ = write!(buf, "{sign}{}", int.bits);
            }
            Key::PtrType(ptr) => {
                buf.push_str(if ptr.is_const { "*const " } else { "*" });
                self.format_into(ptr.child, names, decl_name, buf);
            }
            Key::ContainerType(key) => match self.container(index) {
                Ok(container) => buf.push_str(&decl_name(container.owner_decl)),
                Err(_) => {
                    let _ = write!(buf, "<{} {:?}>", key.kind.keyword(), key.zir_index);
                }
            },
            Key::ErrorSetType(set) => {
                buf.push_str("error{");
                for (i, name) in set.names().iter().enumerate() {
                    if i > 0 {
                        buf.push(',');
                    }
                    buf.push_str(names.lookup(*name));
                }
                buf.push('}');
            }
            Key::ErrorUnionType { error_set, payload } => {
                self.format_into(error_set, names, decl_name, buf);
                buf.push('!');
                self.format_into(payload, names, decl_name, buf);
            }
            Key::FuncType(func) => {
                buf.push_str("fn(");
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    self.format_into(*param, names, decl_name, buf);
                }
                buf.push_str(") ");
                if func.inferred_error_set {
                    buf.push('!');
                }
                self.format_into(func.ret, names, decl_name, buf);
            }
            Key::SimpleValue(value) => buf.push_str(match value {
                SimpleValue::Void => "{}",
                SimpleValue::True => "true",
                SimpleValue::False => "false",
            }),
            Key::Int(int) => {
                let _ = write!(buf, "{}", int.value);
            }
            Key::Err(err) => {
                let _ = write!(buf, "error.{}", names.lookup(err.name));
            }
            Key::Func(func) => {
                let _ = write!(buf, "<fn {:?}>", func.func);
            }
            Key::DeclPtr(ptr) => {
                buf.push('&');
                buf.push_str(&decl_name(ptr.decl));
            }
        }
    }
}
