//! Container types: creation, reuse across updates, and field resolution.

use super::Sema;
use crate::errors::{AnalysisError, AnalysisFail, SemaResult};
use crate::namespace::Namespace;
use crate::scan::scan_namespace;
use crate::unit::{AnalUnit, Dependee};
use kiln_diagnostic::{ErrorCode, ErrorMsg, LazySrcLoc};
use kiln_intern::{ContainerKey, FieldsState, GetOrBegin, Index, InternError};
use kiln_ir::{FileIndex, InstIndex, LoweredIr, NamespaceIndex};
use rustc_hash::FxHashSet;

impl Sema<'_, '_> {
    /// The container type declared by `inst` in `file`, owned by the
    /// owner's declaration.
    ///
    /// An existing type is reused and its namespace rescanned, unless the
    /// owner's source changed, in which case the old type is removed and a
    /// new one created. Either way the namespace keeps its declarations.
    #[tracing::instrument(level = "debug", skip(self, src), fields(owner = ?self.owner))]
    pub fn create_container_type(
        &mut self,
        file: FileIndex,
        inst: InstIndex,
        parent: Option<NamespaceIndex>,
        src: LazySrcLoc,
    ) -> SemaResult<Index> {
        let AnalUnit::Decl(owner_decl) = self.owner else {
            return Err(self.fail(
                ErrorCode::E1007,
                src,
                "unable to analyze: container types cannot be declared in function bodies",
            ));
        };
        let Some(ir) = self.db().files.file(file).analysis_ir().cloned() else {
            return Err(self.internal(src, "file has no IR"));
        };
        let Some(container) = ir.container(inst) else {
            return Err(self.internal(src, "instruction does not declare a container"));
        };
        let tracked = self.track(file, inst);
        self.declare_dependency(Dependee::Namespace(tracked));

        let key = ContainerKey {
            kind: container.kind,
            zir_index: tracked,
        };
        let mut begun = self.db_mut().pool.get_or_begin_type(key);
        if let Ok(GetOrBegin::Existing(existing)) = begun {
            let owner = self.db().pool.container(existing).map(|c| c.owner_decl);
            if owner != Ok(owner_decl) || self.owned_types.contains(&existing) {
                return Ok(existing);
            }
            if !self.type_outdated {
                return self.reuse_container_type(existing, &ir, inst, parent, src);
            }
            tracing::debug!(?existing, "recreating outdated type");
            self.db_mut().pool.remove(existing);
            begun = self.db_mut().pool.get_or_begin_type(key);
        }
        let wip = match begun {
            Ok(GetOrBegin::Wip(wip)) => wip,
            Ok(GetOrBegin::Existing(existing)) => return Ok(existing),
            Err(err) => return Err(self.internal(src, &err.to_string())),
        };

        let mut seen = FxHashSet::default();
        for (name, _) in container.fields() {
            let name = ir.string(name);
            if !seen.insert(name) {
                self.db_mut().pool.cancel(wip);
                return Err(self.fail(
                    ErrorCode::E1004,
                    src,
                    format!("duplicate {} field name '{name}'", container.kind.keyword()),
                ));
            }
        }

        let db = self.db_mut();
        let namespace = match db.namespace_by_inst.get(&tracked).copied() {
            Some(namespace) => {
                let ns = db.namespace_mut(namespace);
                ns.parent = parent;
                ns.owner_decl = owner_decl;
                namespace
            }
            None => db.add_namespace(Namespace::new(parent, file, owner_decl, tracked)),
        };
        let ty = db.pool.finish(wip, owner_decl, namespace);
        tracing::debug!(?ty, ?namespace, "created container type");
        self.owned_types.push(ty);
        scan_namespace(self.cx, namespace, &ir, inst);
        Ok(ty)
    }

    fn reuse_container_type(
        &mut self,
        ty: Index,
        ir: &LoweredIr,
        inst: InstIndex,
        parent: Option<NamespaceIndex>,
        src: LazySrcLoc,
    ) -> SemaResult<Index> {
        let (namespace, fields_state, old_fields) = match self.db().pool.container(ty) {
            Ok(c) => (c.namespace, c.fields_state, c.fields.clone()),
            Err(err) => return Err(self.internal(src, &err.to_string())),
        };
        self.db_mut().namespace_mut(namespace).parent = parent;
        if !self.owned_types.contains(&ty) {
            self.owned_types.push(ty);
        }
        scan_namespace(self.cx, namespace, ir, inst);

        if matches!(fields_state, FieldsState::Resolved | FieldsState::Failed) {
            // Field types may have been read from declarations that changed.
            if let Ok(c) = self.db_mut().pool.container_mut(ty) {
                c.fields_state = FieldsState::Unresolved;
                c.fields.clear();
            }
            self.resolve_type_fields(ty, src)?;
            let new_fields = self.db().pool.container(ty).map(|c| c.fields.clone());
            if new_fields.as_ref() != Ok(&old_fields) {
                tracing::debug!(?ty, "fields changed");
                self.fields_changed = true;
            }
        }
        Ok(ty)
    }

    /// Resolve the field types of container `ty`.
    ///
    /// Fields are resolved on behalf of the type's owner declaration; a
    /// caller other than the owner depends on the owner's value.
    pub fn resolve_type_fields(&mut self, ty: Index, src: LazySrcLoc) -> SemaResult<()> {
        let (owner_decl, state) = match self.db().pool.container(ty) {
            Ok(c) => (c.owner_decl, c.fields_state),
            Err(InternError::NotAContainer { .. }) => return Ok(()),
            Err(err) => return Err(self.internal(src, &err.to_string())),
        };
        let owner = AnalUnit::Decl(owner_decl);
        if self.owner != owner {
            self.declare_dependency(Dependee::DeclVal(owner_decl));
            self.cx.db.references.add(self.owner, owner, src);
        }
        match state {
            FieldsState::Resolved => return Ok(()),
            FieldsState::Failed => return Err(AnalysisFail),
            FieldsState::Resolving => {
                let rendered = self.format_value(ty);
                return Err(self.fail(
                    ErrorCode::E1002,
                    src,
                    format!("dependency loop detected: type '{rendered}' depends on itself"),
                ));
            }
            FieldsState::Unresolved => {}
        }
        self.set_fields_state(ty, FieldsState::Resolving);

        let analyzer = self.cx.analyzer;
        let result = if self.owner == owner {
            analyzer.resolve_container_fields(self, ty)
        } else {
            let mut nested = Sema::new(self.cx, owner, false);
            let result = analyzer.resolve_container_fields(&mut nested, ty);
            let output = nested.finish();
            let decl = self.db_mut().decl_mut(owner_decl);
            for owned in output.owned_types {
                if !decl.owned_types.contains(&owned) {
                    decl.owned_types.push(owned);
                }
            }
            result
        };

        match result {
            Ok(fields) => {
                if let Ok(c) = self.db_mut().pool.container_mut(ty) {
                    c.fields = fields;
                    c.fields_state = FieldsState::Resolved;
                }
                Ok(())
            }
            Err(AnalysisError::Fail(fail)) => {
                self.set_fields_state(ty, FieldsState::Failed);
                Err(fail)
            }
            Err(err) => {
                self.set_fields_state(ty, FieldsState::Failed);
                let db = self.db_mut();
                db.push_retryable(owner);
                db.record_failure(
                    owner,
                    ErrorMsg::new(ErrorCode::E1007, src, format!("unable to analyze: {err}")),
                );
                Err(AnalysisFail)
            }
        }
    }

    fn set_fields_state(&mut self, ty: Index, state: FieldsState) {
        if let Ok(c) = self.db_mut().pool.container_mut(ty) {
            c.fields_state = state;
        }
    }

    /// An invariant of the compiler itself was violated.
    fn internal(&mut self, src: LazySrcLoc, what: &str) -> AnalysisFail {
        tracing::error!(owner = ?self.owner, what, "internal analysis error");
        self.fail(ErrorCode::E9001, src, format!("internal compiler error: {what}"))
    }
}
