//! file: core/src/ir/lower/scope.rs
//! description: scoped name bindings and per-call frames.

use std::collections::HashMap;

use super::operand::{Binding, Operand};

pub type Scope = HashMap<String, Binding>;

pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { scopes: vec![HashMap::new()] }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pops the innermost scope and returns its bindings.
    pub fn exit_scope(&mut self) -> Scope {
        if self.scopes.len() == 1 {
            return HashMap::new();
        }
        self.scopes.pop().unwrap_or_default()
    }

    /// Drops inner scopes and takes the bindings of the outermost one.
    pub fn exit_root(&mut self) -> Scope {
        self.scopes.truncate(1);
        self.scopes.first_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn insert(&mut self, name: &str, binding: Binding) {
        if let Some(current) = self.scopes.last_mut() {
            current.insert(name.to_string(), binding);
        }
    }

    /// Binds `name` in the outermost scope, visible after inner scopes unwind.
    pub fn insert_root(&mut self, name: &str, binding: Binding) {
        if let Some(root) = self.scopes.first_mut() {
            root.insert(name.to_string(), binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes.last().map(|s| s.contains_key(name)).unwrap_or(false)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRole {
    Kernel,
    Func,
    Host,
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    RangeFor,
    StructFor,
    Static,
}

#[derive(Debug, Clone)]
pub struct LoopContext {
    pub kind: LoopKind,
    pub break_label: Option<String>,
    pub continue_label: Option<String>,
}

/// Lowering state of one kernel body or inlined call.
pub struct Frame {
    pub name: String,
    pub role: FrameRole,
    pub table: SymbolTable,
    pub return_value: Option<Operand>,
    /// Number of enclosing runtime `if`/loop constructs.
    pub runtime_depth: usize,
    pub loops: Vec<LoopContext>,
}

impl Frame {
    pub fn new(name: &str, role: FrameRole) -> Self {
        Frame {
            name: name.to_string(),
            role,
            table: SymbolTable::new(),
            return_value: None,
            runtime_depth: 0,
            loops: Vec::new(),
        }
    }
}

/// Whether lowering a statement list should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Returned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::lower::static_value::StaticValue;

    #[test]
    fn inner_scopes_shadow_and_unwind() {
        let mut table = SymbolTable::new();
        table.insert("n", Binding::Static(StaticValue::Int(1)));
        table.enter_scope();
        table.insert("n", Binding::Static(StaticValue::Int(2)));
        assert_eq!(table.lookup("n"), Some(&Binding::Static(StaticValue::Int(2))));
        assert!(table.exists_in_current_scope("n"));
        let popped = table.exit_scope();
        assert_eq!(popped.len(), 1);
        assert_eq!(table.lookup("n"), Some(&Binding::Static(StaticValue::Int(1))));
        assert_eq!(table.depth(), 1);
        assert!(table.exit_scope().is_empty());
    }

    #[test]
    fn root_bindings_survive_inner_scopes() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.insert_root("total", Binding::Static(StaticValue::Int(3)));
        assert!(!table.exists_in_current_scope("total"));
        table.exit_scope();
        assert_eq!(table.exit_root().get("total"), Some(&Binding::Static(StaticValue::Int(3))));
    }
}
