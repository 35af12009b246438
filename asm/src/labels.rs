//! The label namespace: an arena of scope records indexed by integer
//! handles, in place of a parent-pointer tree (`vasm::labels::LabelMap`
//! walks a flat map keyed by name instead; here scopes nest, so a parent
//! handle plays that role).

use crate::instruction::Instruction;
use crate::variable::Variable;
use spasm::Token;
use std::collections::HashMap;

pub type Handle = usize;

#[derive(Clone, Debug)]
pub enum ScopeEntry {
    Instruction(Instruction),
    Variable(String),
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub name: String,
    pub address: Option<u32>,
    pub parent: Option<Handle>,
    pub children: HashMap<String, Handle>,
    pub local_variables: HashMap<String, Variable>,
    pub entries: Vec<ScopeEntry>,
    pub definition_line: u32,
    pub definition_file: String,
}

#[derive(Debug)]
pub struct LabelArena {
    scopes: Vec<Scope>,
}

impl Default for LabelArena {
    fn default() -> LabelArena {
        LabelArena::new()
    }
}

impl LabelArena {
    pub fn new() -> LabelArena {
        let root = Scope {
            name: String::new(),
            address: None,
            parent: None,
            children: HashMap::new(),
            local_variables: HashMap::new(),
            entries: Vec::new(),
            definition_line: 0,
            definition_file: String::new(),
        };
        LabelArena { scopes: vec![root] }
    }

    pub fn root(&self) -> Handle {
        0
    }

    pub fn scope(&self, handle: Handle) -> &Scope {
        &self.scopes[handle]
    }

    /// Declares a new label scope as a child of `parent`. Redefinition of
    /// the same name directly under the same parent is an error reported
    /// against both definition sites.
    pub fn declare_label(&mut self, parent: Handle, name: &str, token: &Token) -> Result<Handle, String> {
        if let Some(&existing) = self.scopes[parent].children.get(name) {
            let previous = &self.scopes[existing];
            return Err(format!(
                "label \"{}\" redefined at {}:{} (first defined at {}:{})",
                name, token.filepath, token.line, previous.definition_file, previous.definition_line
            ));
        }
        let handle = self.scopes.len();
        self.scopes.push(Scope {
            name: name.to_string(),
            address: None,
            parent: Some(parent),
            children: HashMap::new(),
            local_variables: HashMap::new(),
            entries: Vec::new(),
            definition_line: token.line,
            definition_file: token.filepath.clone(),
        });
        self.scopes[parent].children.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Declares `variable` in `scope` (P4: unique within that scope).
    pub fn declare_variable(&mut self, scope: Handle, variable: Variable) -> Result<(), String> {
        if let Some(existing) = self.scopes[scope].local_variables.get(&variable.name) {
            return Err(format!(
                "variable \"{}\" redefined in the same scope (first defined at {}:{})",
                variable.name, existing.definition_file, existing.definition_line
            ));
        }
        let name = variable.name.clone();
        self.scopes[scope].entries.push(ScopeEntry::Variable(name.clone()));
        self.scopes[scope].local_variables.insert(name, variable);
        Ok(())
    }

    /// Walks the parent chain from `from`; the first scope defining `name`
    /// wins (P4).
    pub fn lookup_variable(&self, from: Handle, name: &str) -> Option<&Variable> {
        let mut current = Some(from);
        while let Some(handle) = current {
            if let Some(variable) = self.scopes[handle].local_variables.get(name) {
                return Some(variable);
            }
            current = self.scopes[handle].parent;
        }
        None
    }

    pub fn push_instruction(&mut self, scope: Handle, instruction: Instruction) {
        self.scopes[scope].entries.push(ScopeEntry::Instruction(instruction));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::variable::{VariableType, VariableValue};

    fn tok(filepath: &str, line: u32) -> Token {
        Token::new(".ignored", line, filepath)
    }

    #[test]
    fn nested_labels_form_a_tree_via_handles() {
        let mut arena = LabelArena::new();
        let root = arena.root();
        let outer = arena.declare_label(root, "outer", &tok("f.spasm", 1)).unwrap();
        let inner = arena.declare_label(outer, "inner", &tok("f.spasm", 2)).unwrap();
        assert_eq!(arena.scope(inner).parent, Some(outer));
        assert_eq!(arena.scope(outer).parent, Some(root));
    }

    #[test]
    fn redefining_a_label_in_the_same_parent_is_an_error() {
        let mut arena = LabelArena::new();
        let root = arena.root();
        arena.declare_label(root, "main", &tok("f.spasm", 1)).unwrap();
        let err = arena.declare_label(root, "main", &tok("f.spasm", 5)).unwrap_err();
        assert!(err.contains("main"));
        assert!(err.contains("5"));
        assert!(err.contains("1"));
    }

    #[test]
    fn variable_lookup_walks_ancestors() {
        let mut arena = LabelArena::new();
        let root = arena.root();
        let child = arena.declare_label(root, "child", &tok("f.spasm", 1)).unwrap();
        arena
            .declare_variable(
                root,
                Variable {
                    name: "COUNT".to_string(),
                    address: None,
                    size_bytes: 2,
                    ty: VariableType::Word,
                    value: VariableValue::Int(4),
                    parent_label: Some(root),
                    definition_line: 1,
                    definition_file: "f.spasm".to_string(),
                },
            )
            .unwrap();

        assert!(arena.lookup_variable(child, "COUNT").is_some());
        assert!(arena.lookup_variable(root, "MISSING").is_none());
    }
}
