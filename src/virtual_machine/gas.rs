//! Gas metering.
//!
//! The core loop asks a [`Meter`] for permission before every instruction. A
//! charge that would push usage past the limit fails with `OutOfGas` and is not
//! recorded, so the reported usage always covers exactly the instructions that ran.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};

/// Default budget for a single script execution.
pub const TRANSACTION_GAS_LIMIT: u64 = 10_000_000;

const GAS_CATEGORY_COUNT: usize = 5;

/// Categories of gas consumption for profiling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// Base cost of ordinary instructions.
    Opcode = 0,
    /// CALL and RET.
    CallOverhead = 1,
    /// EXTCALL dispatch and non-storage interops.
    Interop = 2,
    StorageRead = 3,
    StorageWrite = 4,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::Opcode => "Opcode",
            GasCategory::CallOverhead => "Call Overhead",
            GasCategory::Interop => "Interop",
            GasCategory::StorageRead => "Storage Read",
            GasCategory::StorageWrite => "Storage Write",
        }
    }

    /// All categories in discriminant order.
    pub const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::Opcode,
        GasCategory::CallOverhead,
        GasCategory::Interop,
        GasCategory::StorageRead,
        GasCategory::StorageWrite,
    ];
}

/// Gas spent per category. Backed by a flat array indexed by discriminant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GasProfile {
    counts: [u64; GAS_CATEGORY_COUNT],
}

impl GasProfile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn add(&mut self, category: GasCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    pub fn get(&self, category: GasCategory) -> u64 {
        self.counts[category as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, u64)> {
        GasCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Pre-execution cost hook used by the core loop.
pub trait Meter {
    /// Charges all of `charges` or none of them.
    fn charge_all(&mut self, charges: &[(GasCategory, u64)]) -> Result<(), VMError>;

    fn charge(&mut self, cost: u64, category: GasCategory) -> Result<(), VMError> {
        self.charge_all(&[(category, cost)])
    }
}

/// Meter that never refuses. Used by the bare VM.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unmetered;

impl Meter for Unmetered {
    fn charge_all(&mut self, _charges: &[(GasCategory, u64)]) -> Result<(), VMError> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct GasMeter {
    used: u64,
    limit: u64,
    profile: GasProfile,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            used: 0,
            limit,
            profile: GasProfile::new(),
        }
    }

    /// A meter whose limit can never be reached in practice.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn profile(&self) -> &GasProfile {
        &self.profile
    }
}

impl Meter for GasMeter {
    fn charge_all(&mut self, charges: &[(GasCategory, u64)]) -> Result<(), VMError> {
        let required = charges
            .iter()
            .fold(0u64, |acc, (_, cost)| acc.saturating_add(*cost));
        let out_of_gas = VMError::OutOfGas {
            used: self.used,
            limit: self.limit,
            required,
        };
        let total = self.used.checked_add(required).ok_or(out_of_gas.clone())?;
        if total > self.limit {
            return Err(out_of_gas);
        }

        self.used = total;
        for (category, cost) in charges {
            self.profile.add(*category, *cost);
        }
        Ok(())
    }
}

/// A [`VirtualMachine`] driven under a gas budget.
pub struct GasMachine {
    vm: VirtualMachine,
    meter: GasMeter,
}

impl GasMachine {
    pub fn new(vm: VirtualMachine, gas_limit: u64) -> Self {
        Self::with_meter(vm, GasMeter::new(gas_limit))
    }

    pub fn with_meter(vm: VirtualMachine, meter: GasMeter) -> Self {
        Self { vm, meter }
    }

    pub fn execute(&mut self) -> ExecutionState {
        self.vm.execute_metered(&mut self.meter)
    }

    pub fn step(&mut self) -> ExecutionState {
        self.vm.step_metered(&mut self.meter)
    }

    pub fn used_gas(&self) -> u64 {
        self.meter.used()
    }

    pub fn gas_limit(&self) -> u64 {
        self.meter.limit()
    }

    pub fn profile(&self) -> &GasProfile {
        self.meter.profile()
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VirtualMachine {
        &mut self.vm
    }

    pub fn into_parts(self) -> (VirtualMachine, GasMeter) {
        (self.vm, self.meter)
    }
}

/// Outcome of a dry run.
#[derive(Clone, Debug)]
pub struct GasEstimate {
    pub used: u64,
    pub state: ExecutionState,
    pub profile: GasProfile,
}

/// Runs `vm` to completion purely to measure gas.
///
/// With `cap = None` the budget is unlimited. The caller owns the VM's storage
/// handle and decides what happens to any writes (normally they are discarded).
pub fn estimate_gas(vm: VirtualMachine, cap: Option<u64>) -> GasEstimate {
    let meter = cap.map_or_else(GasMeter::unlimited, GasMeter::new);
    let mut machine = GasMachine::with_meter(vm, meter);
    let state = machine.execute();
    let (_, meter) = machine.into_parts();
    GasEstimate {
        used: meter.used(),
        state,
        profile: meter.profile,
    }
}
