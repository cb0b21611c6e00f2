//! Host functions callable from bytecode through `EXTCALL`.
//!
//! Interops are registered by name in an [`InteropTable`] once, before the run,
//! and invoked through one uniform callback signature.

use crate::storage::context::SharedStorage;
use crate::storage::map::StorageMap;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::frame::ExecutionFrame;
use crate::virtual_machine::gas::GasCategory;
use crate::virtual_machine::object::{FromObject, VMObject};
use crate::virtual_machine::stack::Stack;
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What the VM does after a successful interop call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteropOutcome {
    Continue,
    Halt,
}

/// Native callback. An `Err` faults the VM and rolls back the call's effects.
pub type InteropFn =
    Arc<dyn Fn(&mut InteropContext<'_>) -> Result<InteropOutcome, VMError> + Send + Sync>;

/// Prefix of the per-context map used by the `Storage.*` interops.
pub const CONTRACT_STORAGE_PREFIX: &[u8] = b"ctx.";

/// View of the running VM handed to an interop callback.
pub struct InteropContext<'a> {
    name: &'a str,
    pub stack: &'a mut Stack,
    pub frame: &'a mut ExecutionFrame,
    storage: Option<&'a SharedStorage>,
    events: &'a mut Vec<VMObject>,
}

impl<'a> InteropContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        stack: &'a mut Stack,
        frame: &'a mut ExecutionFrame,
        storage: Option<&'a SharedStorage>,
        events: &'a mut Vec<VMObject>,
    ) -> Self {
        Self {
            name,
            stack,
            frame,
            storage,
            events,
        }
    }

    /// Name the interop was invoked under.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Name of the context executing the `EXTCALL`.
    pub fn context_name(&self) -> &str {
        self.frame.context().name()
    }

    pub fn pop(&mut self) -> Result<VMObject, VMError> {
        self.stack.pop()
    }

    pub fn pop_as<T: FromObject>(&mut self) -> Result<T, VMError> {
        T::from_object(&self.stack.pop()?)
    }

    pub fn push(&mut self, value: impl Into<VMObject>) -> Result<(), VMError> {
        self.stack.push(value.into())
    }

    /// Appends to the run's event log.
    pub fn notify(&mut self, event: VMObject) {
        self.events.push(event);
    }

    pub fn fail(&self, reason: impl Into<String>) -> VMError {
        VMError::InteropFailed {
            name: self.name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn storage(&self) -> Result<&SharedStorage, VMError> {
        self.storage
            .ok_or_else(|| self.fail("no storage attached to this run"))
    }

    /// The storage map private to the executing context.
    pub fn contract_storage(&self) -> Result<StorageMap, VMError> {
        let mut prefix = CONTRACT_STORAGE_PREFIX.to_vec();
        prefix.extend_from_slice(self.context_name().as_bytes());
        Ok(StorageMap::new(prefix, self.storage()?.clone()))
    }
}

/// A registered interop.
#[derive(Clone)]
pub struct Interop {
    pub cost: u64,
    pub category: GasCategory,
    pub callback: InteropFn,
}

impl fmt::Debug for Interop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interop")
            .field("cost", &self.cost)
            .field("category", &self.category)
            .finish()
    }
}

/// Name to callback table.
#[derive(Clone, Debug, Default)]
pub struct InteropTable {
    entries: HashMap<String, Interop>,
}

impl InteropTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, cost: u64, category: GasCategory, callback: F)
    where
        F: Fn(&mut InteropContext<'_>) -> Result<InteropOutcome, VMError> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            Interop {
                cost,
                category,
                callback: Arc::new(callback),
            },
        );
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, cost: u64, category: GasCategory, callback: F) -> Self
    where
        F: Fn(&mut InteropContext<'_>) -> Result<InteropOutcome, VMError> + Send + Sync + 'static,
    {
        self.register(name, cost, category, callback);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Interop> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn storage_error(ctx: &InteropContext<'_>, err: impl fmt::Display) -> VMError {
    ctx.fail(err.to_string())
}

pub(crate) fn concat(left: VMObject, right: VMObject) -> Result<VMObject, VMError> {
    match (left, right) {
        (VMObject::String(mut l), VMObject::String(r)) => {
            l.push_str(&r);
            Ok(VMObject::String(l))
        }
        (VMObject::Bytes(mut l), VMObject::Bytes(r)) => {
            l.extend_from_slice(&r);
            Ok(VMObject::Bytes(l))
        }
        (VMObject::String(_), other) => Err(VMError::TypeMismatch {
            expected: "String",
            actual: other.type_name(),
        }),
        (VMObject::Bytes(_), other) => Err(VMError::TypeMismatch {
            expected: "Bytes",
            actual: other.type_name(),
        }),
        (other, _) => Err(VMError::TypeMismatch {
            expected: "String or Bytes",
            actual: other.type_name(),
        }),
    }
}

/// Interops every node registers.
///
/// Case mapping is ASCII-only so results never depend on a Unicode table version.
pub fn standard_library() -> InteropTable {
    InteropTable::new()
        .with("Upper", 10, GasCategory::Interop, |ctx| {
            let s: String = ctx.pop_as()?;
            ctx.push(s.to_ascii_uppercase())?;
            Ok(InteropOutcome::Continue)
        })
        .with("Lower", 10, GasCategory::Interop, |ctx| {
            let s: String = ctx.pop_as()?;
            ctx.push(s.to_ascii_lowercase())?;
            Ok(InteropOutcome::Continue)
        })
        .with("Concat", 10, GasCategory::Interop, |ctx| {
            let right = ctx.pop()?;
            let left = ctx.pop()?;
            ctx.push(concat(left, right)?)?;
            Ok(InteropOutcome::Continue)
        })
        .with("Size", 5, GasCategory::Interop, |ctx| {
            let len = match ctx.pop()? {
                VMObject::String(s) => s.len(),
                VMObject::Bytes(b) => b.len(),
                other => {
                    return Err(VMError::TypeMismatch {
                        expected: "String or Bytes",
                        actual: other.type_name(),
                    });
                }
            };
            ctx.push(BigInt::from(len))?;
            Ok(InteropOutcome::Continue)
        })
        .with("Runtime.Notify", 20, GasCategory::Interop, |ctx| {
            let event = ctx.pop()?;
            ctx.notify(event);
            Ok(InteropOutcome::Continue)
        })
        .with("Runtime.Context", 5, GasCategory::Interop, |ctx| {
            let name = ctx.context_name().to_string();
            ctx.push(name)?;
            Ok(InteropOutcome::Continue)
        })
        .with("Storage.Get", 100, GasCategory::StorageRead, |ctx| {
            let key = ctx.pop()?;
            let map = ctx.contract_storage()?;
            let value: VMObject = map.get(&key).map_err(|e| storage_error(ctx, e))?;
            ctx.push(value)?;
            Ok(InteropOutcome::Continue)
        })
        .with("Storage.Has", 50, GasCategory::StorageRead, |ctx| {
            let key = ctx.pop()?;
            let map = ctx.contract_storage()?;
            let present = map.contains_key(&key).map_err(|e| storage_error(ctx, e))?;
            ctx.push(present)?;
            Ok(InteropOutcome::Continue)
        })
        .with("Storage.Put", 1000, GasCategory::StorageWrite, |ctx| {
            let value = ctx.pop()?;
            let key = ctx.pop()?;
            let map = ctx.contract_storage()?;
            map.set(&key, &value).map_err(|e| storage_error(ctx, e))?;
            Ok(InteropOutcome::Continue)
        })
        .with("Storage.Delete", 200, GasCategory::StorageWrite, |ctx| {
            let key = ctx.pop()?;
            let map = ctx.contract_storage()?;
            map.remove(&key).map_err(|e| storage_error(ctx, e))?;
            Ok(InteropOutcome::Continue)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::virtual_machine::context::ExecutionContext;

    struct Harness {
        stack: Stack,
        frame: ExecutionFrame,
        storage: Option<SharedStorage>,
        events: Vec<VMObject>,
    }

    impl Harness {
        fn new(storage: Option<SharedStorage>) -> Self {
            let context = Arc::new(ExecutionContext::new("token", vec![0x00], 0));
            Self {
                stack: Stack::new(16),
                frame: ExecutionFrame::new(context, 0, 4),
                storage,
                events: Vec::new(),
            }
        }

        fn call(&mut self, table: &InteropTable, name: &str) -> Result<InteropOutcome, VMError> {
            let interop = table.get(name).expect("interop registered");
            let mut ctx = InteropContext::new(
                name,
                &mut self.stack,
                &mut self.frame,
                self.storage.as_ref(),
                &mut self.events,
            );
            (interop.callback)(&mut ctx)
        }
    }

    #[test]
    fn upper_and_lower_are_ascii_only() {
        let lib = standard_library();
        let mut h = Harness::new(None);
        h.stack.push(VMObject::from("héllo".to_string())).unwrap();
        h.call(&lib, "Upper").unwrap();
        assert_eq!(h.stack.peek(0).unwrap(), &VMObject::from("HéLLO".to_string()));
        h.call(&lib, "Lower").unwrap();
        assert_eq!(h.stack.peek(0).unwrap(), &VMObject::from("héllo".to_string()));
    }

    #[test]
    fn concat_keeps_operand_order() {
        let lib = standard_library();
        let mut h = Harness::new(None);
        h.stack.push(VMObject::from("ab".to_string())).unwrap();
        h.stack.push(VMObject::from("cd".to_string())).unwrap();
        h.call(&lib, "Concat").unwrap();
        assert_eq!(h.stack.as_slice(), &[VMObject::from("abcd".to_string())]);
    }

    #[test]
    fn concat_rejects_mixed_types() {
        let lib = standard_library();
        let mut h = Harness::new(None);
        h.stack.push(VMObject::from("ab".to_string())).unwrap();
        h.stack.push(VMObject::from(vec![1u8])).unwrap();
        assert_eq!(
            h.call(&lib, "Concat"),
            Err(VMError::TypeMismatch {
                expected: "String",
                actual: "Bytes"
            })
        );
    }

    #[test]
    fn size_counts_utf8_bytes() {
        let lib = standard_library();
        let mut h = Harness::new(None);
        h.stack.push(VMObject::from("é".to_string())).unwrap();
        h.call(&lib, "Size").unwrap();
        assert_eq!(h.stack.pop().unwrap(), VMObject::from(2i64));
    }

    #[test]
    fn notify_and_context() {
        let lib = standard_library();
        let mut h = Harness::new(None);
        h.stack.push(VMObject::from(7i64)).unwrap();
        h.call(&lib, "Runtime.Notify").unwrap();
        h.call(&lib, "Runtime.Context").unwrap();
        assert_eq!(h.events, vec![VMObject::from(7i64)]);
        assert_eq!(h.stack.pop().unwrap(), VMObject::from("token".to_string()));
    }

    #[test]
    fn storage_round_trip_under_context_prefix() {
        let storage = MemoryStorage::shared();
        let lib = standard_library();
        let mut h = Harness::new(Some(storage.clone()));

        h.stack.push(VMObject::from("owner".to_string())).unwrap();
        h.stack.push(VMObject::from(42i64)).unwrap();
        h.call(&lib, "Storage.Put").unwrap();
        assert!(h.stack.is_empty());

        let map = StorageMap::new(b"ctx.token".to_vec(), storage);
        assert_eq!(map.count().unwrap(), 1);
        assert_eq!(map.get::<_, i64>("owner").unwrap(), 42);

        h.stack.push(VMObject::from("owner".to_string())).unwrap();
        h.call(&lib, "Storage.Get").unwrap();
        assert_eq!(h.stack.pop().unwrap(), VMObject::from(42i64));

        h.stack.push(VMObject::from("owner".to_string())).unwrap();
        h.call(&lib, "Storage.Delete").unwrap();
        h.stack.push(VMObject::from("owner".to_string())).unwrap();
        h.call(&lib, "Storage.Has").unwrap();
        assert_eq!(h.stack.pop().unwrap(), VMObject::Bool(false));
    }

    #[test]
    fn storage_without_backend_fails() {
        let lib = standard_library();
        let mut h = Harness::new(None);
        h.stack.push(VMObject::from("k".to_string())).unwrap();
        assert!(matches!(
            h.call(&lib, "Storage.Get"),
            Err(VMError::InteropFailed { name, .. }) if name == "Storage.Get"
        ));
    }

    #[test]
    fn table_lists_names_sorted() {
        let table = InteropTable::new()
            .with("b", 1, GasCategory::Interop, |_| Ok(InteropOutcome::Continue))
            .with("a", 1, GasCategory::Interop, |_| Ok(InteropOutcome::Halt));
        assert_eq!(table.names(), vec!["a", "b"]);
        assert_eq!(table.get("a").map(|i| i.cost), Some(1));
        assert!(!table.contains("c"));
    }
}
