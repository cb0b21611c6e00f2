//! Runs scripts against storage and turns the outcome into a [`Receipt`].
//!
//! Each run writes through a private [`OverlayStorage`]. Its writes reach the
//! caller's storage only when the script halts; a fault or an exhausted gas
//! budget leaves the base storage exactly as it was.

use crate::core::receipt::Receipt;
use crate::storage::{OverlayStorage, SharedStorage};
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use crate::virtual_machine::config::VmConfig;
use crate::virtual_machine::context::ContextResolver;
use crate::virtual_machine::gas::{GasEstimate, GasMachine, estimate_gas};
use crate::virtual_machine::interop::{InteropTable, standard_library};
use crate::virtual_machine::object::VMObject;
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};
use crate::{debug, info, warn};
use std::sync::Arc;

/// Shared configuration for script runs. Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    config: VmConfig,
    interops: Arc<InteropTable>,
    resolver: Option<ContextResolver>,
    entry_name: Option<String>,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            config: VmConfig::default(),
            interops: Arc::new(standard_library()),
            resolver: None,
            entry_name: None,
        }
    }
}

impl Executor {
    /// Default limits and the standard interop library.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_interops(mut self, interops: impl Into<Arc<InteropTable>>) -> Self {
        self.interops = interops.into();
        self
    }

    pub fn with_resolver(mut self, resolver: ContextResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Runs the entry script under `name`, which selects its contract storage area.
    pub fn with_entry_name(mut self, name: impl Into<String>) -> Self {
        self.entry_name = Some(name.into());
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn interops(&self) -> &InteropTable {
        &self.interops
    }

    fn machine(&self, script: Bytes, storage: SharedStorage) -> VirtualMachine {
        let mut vm = VirtualMachine::new(script, self.config.clone())
            .with_interops(Arc::clone(&self.interops))
            .with_storage(storage);
        if let Some(name) = &self.entry_name {
            vm = vm.with_entry_name(name.clone());
        }
        if let Some(resolver) = &self.resolver {
            vm = vm.with_resolver(Arc::clone(resolver));
        }
        vm
    }

    /// Executes `script` with no arguments.
    pub fn execute(
        &self,
        script: impl Into<Bytes>,
        gas_limit: u64,
        storage: SharedStorage,
    ) -> Receipt {
        self.invoke(script, &[], gas_limit, storage)
    }

    /// Executes `script` with `args` pushed onto the stack in order, so the last
    /// argument is on top when the first instruction runs.
    pub fn invoke(
        &self,
        script: impl Into<Bytes>,
        args: &[VMObject],
        gas_limit: u64,
        storage: SharedStorage,
    ) -> Receipt {
        let script = script.into();
        let script_hash = Hash::digest(script.as_slice());
        let overlay = Arc::new(OverlayStorage::new(storage));
        let mut vm = self.machine(script, overlay.clone());

        if let Some(err) = args.iter().find_map(|arg| vm.push_argument(arg.clone()).err()) {
            warn!("Script {script_hash} rejected: {err}");
            return Receipt {
                script_hash,
                success: false,
                gas_used: 0,
                fault: Some(err.to_string()),
                result: None,
                events: Vec::new(),
            };
        }

        let mut machine = GasMachine::new(vm, gas_limit);
        let state = machine.execute();
        let gas_used = machine.used_gas();
        let (mut vm, _) = machine.into_parts();
        let result = vm.result().cloned();

        let fault = match &state {
            ExecutionState::Halt => match overlay.commit() {
                Ok(()) => None,
                Err(err) => Some(format!("storage commit failed: {err}")),
            },
            ExecutionState::Fault(err) => Some(err.to_string()),
            other => Some(format!("script stopped in state {other}")),
        };

        match &fault {
            None => {
                info!(
                    "Script {} halted: gas_used={} events={}",
                    script_hash,
                    gas_used,
                    vm.events().len()
                );
                Receipt {
                    script_hash,
                    success: true,
                    gas_used,
                    fault: None,
                    result,
                    events: vm.take_events(),
                }
            }
            Some(reason) => {
                overlay.discard();
                warn!("Script {script_hash} faulted: {reason} (gas_used={gas_used})");
                Receipt {
                    script_hash,
                    success: false,
                    gas_used,
                    fault,
                    result,
                    events: Vec::new(),
                }
            }
        }
    }

    /// Dry-runs `script` and reports the gas it needs. Storage is never modified.
    ///
    /// The run stops with `OutOfGas` once it would spend more than `cap`.
    pub fn estimate(
        &self,
        script: impl Into<Bytes>,
        cap: u64,
        storage: SharedStorage,
    ) -> GasEstimate {
        let overlay = Arc::new(OverlayStorage::new(storage));
        let vm = self.machine(script.into(), overlay.clone());
        let estimate = estimate_gas(vm, Some(cap));
        debug!(
            "Estimated {} gas ({} pending writes discarded)",
            estimate.used,
            overlay.pending()
        );
        overlay.discard();
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageContext, StorageMap};
    use crate::virtual_machine::errors::VMError;
    use crate::virtual_machine::gas::TRANSACTION_GAS_LIMIT;
    use crate::virtual_machine::interop::CONTRACT_STORAGE_PREFIX;
    use crate::virtual_machine::isa::Instruction;
    use crate::virtual_machine::script::ScriptBuilder;

    fn put_script(key: &str, value: i64) -> ScriptBuilder {
        let mut b = ScriptBuilder::new();
        b.push_str(key).push_int(value).ext_call("Storage.Put");
        b
    }

    fn token_storage(storage: &SharedStorage) -> StorageMap {
        let mut prefix = CONTRACT_STORAGE_PREFIX.to_vec();
        prefix.extend_from_slice(b"token");
        StorageMap::new(prefix, Arc::clone(storage))
    }

    #[test]
    fn halted_script_commits_its_writes() {
        let storage = MemoryStorage::shared();
        let script = put_script("supply", 1000).push_int(1).build().unwrap();

        let receipt = Executor::new()
            .with_entry_name("token")
            .execute(script.clone(), TRANSACTION_GAS_LIMIT, Arc::clone(&storage));

        assert!(receipt.success, "{:?}", receipt.fault);
        assert_eq!(receipt.script_hash, Hash::digest(&script));
        assert_eq!(receipt.result, Some(VMObject::from(1i64)));
        let supply: i64 = token_storage(&storage).get("supply").unwrap();
        assert_eq!(supply, 1000);
    }

    #[test]
    fn faulted_script_leaves_storage_untouched() {
        let storage = MemoryStorage::shared();
        let script = put_script("supply", 1000)
            .push_int(1)
            .push_int(0)
            .emit(Instruction::Div)
            .build()
            .unwrap();

        let receipt = Executor::new().execute(script, TRANSACTION_GAS_LIMIT, Arc::clone(&storage));

        assert!(!receipt.success);
        assert_eq!(receipt.fault, Some(VMError::DivisionByZero.to_string()));
        assert!(storage.scan_prefix(b"").unwrap().is_empty());
    }

    #[test]
    fn out_of_gas_reports_charged_gas() {
        let storage = MemoryStorage::shared();
        let script = put_script("key", 1).build().unwrap();

        let receipt = Executor::new().execute(script, 100, Arc::clone(&storage));

        assert!(!receipt.success);
        assert_eq!(receipt.gas_used, 4);
        assert!(receipt.fault.unwrap().contains("out of gas"));
        assert!(storage.scan_prefix(b"").unwrap().is_empty());
    }

    #[test]
    fn events_are_kept_only_on_success() {
        let storage = MemoryStorage::shared();
        let ok = ScriptBuilder::new()
            .push_str("minted")
            .ext_call("Runtime.Notify")
            .build()
            .unwrap();
        let receipt = Executor::new().execute(ok.clone(), TRANSACTION_GAS_LIMIT, Arc::clone(&storage));
        assert_eq!(receipt.events, vec![VMObject::from("minted".to_string())]);

        let mut failing = ok;
        failing.push(0xFF);
        let receipt = Executor::new().execute(failing, TRANSACTION_GAS_LIMIT, storage);
        assert!(!receipt.success);
        assert!(receipt.events.is_empty());
    }

    #[test]
    fn arguments_are_pushed_in_order() {
        let script = ScriptBuilder::new().emit(Instruction::Sub).build().unwrap();
        let receipt = Executor::new().invoke(
            script,
            &[VMObject::from(10i64), VMObject::from(3i64)],
            TRANSACTION_GAS_LIMIT,
            MemoryStorage::shared(),
        );
        assert_eq!(receipt.result, Some(VMObject::from(7i64)));
    }

    #[test]
    fn estimate_never_writes() {
        let storage = MemoryStorage::shared();
        let script = put_script("key", 1).build().unwrap();

        let estimate =
            Executor::new().estimate(script.clone(), TRANSACTION_GAS_LIMIT, Arc::clone(&storage));
        assert!(estimate.state.is_halt());
        assert!(storage.scan_prefix(b"").unwrap().is_empty());

        let receipt = Executor::new().execute(script, estimate.used, storage);
        assert!(receipt.success);
        assert_eq!(receipt.gas_used, estimate.used);
    }

    #[test]
    fn estimate_of_endless_loop_stops_at_cap() {
        let script = ScriptBuilder::new().label("spin").jmp("spin").build().unwrap();
        let estimate = Executor::new().estimate(script, 1_000, MemoryStorage::shared());

        assert_eq!(
            estimate.state,
            ExecutionState::Fault(VMError::OutOfGas {
                used: 1_000,
                limit: 1_000,
                required: 5
            })
        );
        assert_eq!(estimate.used, 1_000);
    }
}
