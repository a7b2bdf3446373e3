//! Removing declarations, types and functions that no longer exist.

use super::AnalysisCx;
use crate::export::ExportStatus;
use crate::func::FuncKey;
use crate::outdated::MarkedPo;
use crate::unit::{AnalUnit, Dependee};
use kiln_intern::Index;
use kiln_ir::{DeclIndex, FuncIndex};

impl AnalysisCx<'_> {
    /// Drop a declaration that left its namespace. Whatever read it is
    /// outdated; its owned types and functions go with it.
    #[tracing::instrument(level = "debug", skip(self), fields(fqn = self.db.fqn(decl_index)))]
    pub(crate) fn detach_decl(&mut self, decl_index: DeclIndex) {
        if self.db.decl(decl_index).deleted {
            return;
        }
        let unit = AnalUnit::Decl(decl_index);
        let was_outdated = self.db.outdated.take(unit) | self.db.outdated.take_file_root(decl_index);
        let marked_po = if was_outdated { MarkedPo::Yes } else { MarkedPo::No };
        self.db.mark_results_outdated(marked_po, unit);

        self.forget_unit(unit);
        self.db.test_functions.shift_remove(&decl_index);

        let decl = self.db.decl_mut(decl_index);
        decl.deleted = true;
        let owned = std::mem::take(&mut decl.owned_types);
        for ty in owned {
            self.destroy_owned_type(ty);
        }

        let funcs: Vec<FuncIndex> = self
            .db
            .live_funcs()
            .filter(|&f| self.db.func(f).owner_decl == decl_index)
            .collect();
        for func in funcs {
            self.delete_orphaned_func(func);
        }
    }

    /// Remove a container type from the pool, along with the declarations
    /// of its namespace.
    pub(crate) fn destroy_owned_type(&mut self, ty: Index) {
        let namespace = match self.db.pool.container(ty) {
            Ok(container) => container.namespace,
            Err(err) => {
                tracing::trace!(?ty, %err, "type already gone");
                return;
            }
        };
        tracing::debug!(?ty, ?namespace, "destroying type");
        self.db.pool.remove(ty);
        let ns = self.db.namespace_mut(namespace);
        let members: Vec<DeclIndex> = ns.decls.drain(..).map(|(_, decl)| decl).collect();
        ns.usingnamespace.clear();
        let zir_index = ns.zir_index;
        if self.db.namespace_by_inst.get(&zir_index) == Some(&namespace) {
            self.db.namespace_by_inst.remove(&zir_index);
        }
        for decl in members {
            self.detach_decl(decl);
        }
    }

    /// Remove a function its owner no longer refers to.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) fn delete_orphaned_func(&mut self, func: FuncIndex) {
        if self.db.func(func).deleted {
            return;
        }
        let unit = AnalUnit::Func(func);
        let marked_po = if self.db.outdated.take(unit) {
            MarkedPo::Yes
        } else {
            MarkedPo::No
        };
        self.db.mark_outdated(marked_po, Dependee::FuncIes(func));
        self.forget_unit(unit);

        let f = self.db.func_mut(func);
        f.deleted = true;
        let (owner_decl, zir_body_inst, ty) = (f.owner_decl, f.zir_body_inst, f.ty);
        let key = FuncKey {
            owner_decl,
            zir_body_inst,
            ty,
        };
        if self.db.func_by_key.get(&key) == Some(&func) {
            self.db.func_by_key.remove(&key);
        }
        self.backend.delete_func(func);
    }

    /// Clear everything a unit recorded about itself.
    fn forget_unit(&mut self, unit: AnalUnit) {
        self.db.graph.remove_dependencies_for_depender(unit);
        self.db.outdated.forget(unit);
        self.db.failures.clear_unit(unit);
        self.delete_unit_exports(unit);
        self.db.references.remove_for_unit(unit);
    }

    /// Withdraw every export `unit` performed.
    pub(crate) fn delete_unit_exports(&mut self, unit: AnalUnit) {
        for (index, export) in self.db.exports.remove_for_unit(unit) {
            self.db.failures.exports.shift_remove(&index);
            if export.status == ExportStatus::Complete {
                let name = self.db.names.lookup(export.name);
                self.backend.delete_export(name);
            }
        }
    }
}

