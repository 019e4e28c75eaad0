//! The shared symbol tables consulted by both the parser and the VM.
//!
//! Spec §4.4 describes the Runtime as owning "the library table, the
//! function table ... the property table ... All mutating methods are
//! protected by per-table mutexes." `SymbolTable` is that shared data; the
//! host-facing `Runtime`/`Library` wrapper in `jinx-runtime` adds
//! performance counters and the `compile()`/`strip_debug_info()` entry
//! points on top of it (see `SPEC_FULL.md` §6 for the crate-boundary
//! rationale). Splitting it this way lets the parser (in `jinx-compiler`)
//! consult the same tables the VM (in `jinx-runtime`) calls into, without
//! either of those two crates depending on each other.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::RwLock;

use crate::error::JinxError;
use crate::signature::{FunctionSignature, PropertyName, Visibility};
use crate::value::Value;

/// What a native (host-registered) function needs to do its job: report an
/// error without unwinding, and reach the opaque user context the embedding
/// host attached to the calling `Script`. Implemented by `jinx-runtime`'s
/// VM state; kept as a trait here so `jinx-core` never depends on the
/// runtime crate.
pub trait NativeContext {
    fn report_error(&mut self, message: &str);
    fn user_context(&self) -> Rc<dyn Any>;
}

pub type NativeFn = Rc<dyn Fn(&mut dyn NativeContext, &[Value]) -> Value>;

/// Where a registered function's executable body lives.
#[derive(Clone)]
pub enum FunctionBody {
    /// A bytecode function: the buffer that defines it (shared so cross-
    /// script calls can execute someone else's bytecode) and the program
    /// counter of its first body instruction (spec §3 call frame).
    Bytecode { buffer: Rc<Vec<u8>>, entry_pc: u32 },
    Native(NativeFn),
}

impl std::fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionBody::Bytecode { entry_pc, .. } => {
                write!(f, "Bytecode{{ entry_pc: {entry_pc} }}")
            }
            FunctionBody::Native(_) => write!(f, "Native(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub signature: FunctionSignature,
    pub body: FunctionBody,
}

#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub name: PropertyName,
    pub value: Value,
}

/// One library's own signatures and property names, used by the parser to
/// resolve unqualified and qualified names (spec §4.2 "Name resolution").
#[derive(Debug, Default, Clone)]
pub struct LibraryIndex {
    pub function_ids: Vec<u64>,
    pub property_ids: Vec<u64>,
}

#[derive(Default)]
struct Tables {
    libraries: HashMap<String, LibraryIndex>,
    functions: HashMap<u64, FunctionEntry>,
    properties: HashMap<u64, PropertyEntry>,
}

/// The Runtime's shared, lock-protected symbol data (spec §4.4, §5: "all
/// mutating methods are protected by per-table mutexes ... multiple
/// scripts may be compiled or registered in parallel").
#[derive(Default)]
pub struct SymbolTable {
    tables: RwLock<Tables>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn get_or_create_library(&self, name: &str) {
        let mut tables = self.tables.write().unwrap();
        tables.libraries.entry(name.to_string()).or_default();
    }

    pub fn library_exists(&self, name: &str) -> bool {
        self.tables.read().unwrap().libraries.contains_key(name)
    }

    pub fn register_function(&self, entry: FunctionEntry) -> Result<u64, JinxError> {
        let id = entry.signature.id;
        let mut tables = self.tables.write().unwrap();
        if tables.functions.contains_key(&id)
            && entry.signature.visibility != Visibility::Local
        {
            return Err(JinxError::resolution(format!(
                "duplicate function definition for signature id {id:#x}"
            )));
        }
        tables
            .libraries
            .entry(entry.signature.library.clone())
            .or_default()
            .function_ids
            .push(id);
        tables.functions.insert(id, entry);
        Ok(id)
    }

    pub fn unregister_function(&self, id: u64) {
        let mut tables = self.tables.write().unwrap();
        tables.functions.remove(&id);
        for lib in tables.libraries.values_mut() {
            lib.function_ids.retain(|f| *f != id);
        }
    }

    pub fn function(&self, id: u64) -> Option<FunctionEntry> {
        self.tables.read().unwrap().functions.get(&id).cloned()
    }

    pub fn functions_in_library(&self, library: &str) -> Vec<FunctionSignature> {
        let tables = self.tables.read().unwrap();
        let Some(idx) = tables.libraries.get(library) else {
            return Vec::new();
        };
        idx.function_ids
            .iter()
            .filter_map(|id| tables.functions.get(id).map(|e| e.signature.clone()))
            .collect()
    }

    pub fn register_property(&self, name: PropertyName, default: Value) -> Result<u64, JinxError> {
        let id = name.id;
        let mut tables = self.tables.write().unwrap();
        if tables.properties.contains_key(&id) {
            return Err(JinxError::resolution(format!(
                "duplicate property definition '{}'",
                name.name
            )));
        }
        tables
            .libraries
            .entry(name.library.clone())
            .or_default()
            .property_ids
            .push(id);
        tables
            .properties
            .insert(id, PropertyEntry { name, value: default });
        Ok(id)
    }

    pub fn properties_in_library(&self, library: &str) -> Vec<PropertyName> {
        let tables = self.tables.read().unwrap();
        let Some(idx) = tables.libraries.get(library) else {
            return Vec::new();
        };
        idx.property_ids
            .iter()
            .filter_map(|id| tables.properties.get(id).map(|e| e.name.clone()))
            .collect()
    }

    pub fn property_value(&self, id: u64) -> Option<Value> {
        self.tables
            .read()
            .unwrap()
            .properties
            .get(&id)
            .map(|e| e.value.clone())
    }

    pub fn set_property_value(&self, id: u64, value: Value) -> Result<(), JinxError> {
        let mut tables = self.tables.write().unwrap();
        let entry = tables
            .properties
            .get_mut(&id)
            .ok_or_else(|| JinxError::resolution(format!("unknown property id {id:#x}")))?;
        if entry.name.read_only {
            return Err(JinxError::resolution(format!(
                "property '{}' is read-only",
                entry.name.name
            )));
        }
        entry.value = value;
        Ok(())
    }

    /// Drop every Collection/Buffer-valued property so shared-ownership
    /// cycles through property storage are broken at shutdown (spec §9).
    pub fn clear_properties(&self) {
        let mut tables = self.tables.write().unwrap();
        for entry in tables.properties.values_mut() {
            entry.value = Value::Null;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{NamePart, SignaturePart};

    fn sig(library: &str, vis: Visibility) -> FunctionSignature {
        FunctionSignature::new(
            library,
            vis,
            vec![SignaturePart::Name(NamePart::new(
                vec!["go".to_string()],
                false,
            ))],
        )
        .unwrap()
    }

    #[test]
    fn register_and_lookup_function() {
        let table = SymbolTable::new();
        let signature = sig("core", Visibility::Public);
        let id = table
            .register_function(FunctionEntry {
                signature: signature.clone(),
                body: FunctionBody::Bytecode {
                    buffer: Rc::new(vec![]),
                    entry_pc: 0,
                },
            })
            .unwrap();
        assert_eq!(id, signature.id);
        assert!(table.function(id).is_some());
        assert_eq!(table.functions_in_library("core").len(), 1);
    }

    #[test]
    fn unregister_removes_local_function() {
        let table = SymbolTable::new();
        let signature = sig("core", Visibility::Local);
        let id = table
            .register_function(FunctionEntry {
                signature,
                body: FunctionBody::Native(Rc::new(|_, _| Value::Null)),
            })
            .unwrap();
        table.unregister_function(id);
        assert!(table.function(id).is_none());
    }

    #[test]
    fn read_only_property_rejects_writes() {
        let table = SymbolTable::new();
        let name = PropertyName::new("core", "limit", Visibility::Public, true);
        let id = table.register_property(name, Value::Integer(10)).unwrap();
        assert!(table.set_property_value(id, Value::Integer(20)).is_err());
    }
}
