/// Limits applied to a single VM run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of items on the shared operand stack.
    pub max_stack_depth: usize,
    /// Registers per frame. Register operands are one byte, so at most 256 are addressable.
    pub register_count: usize,
    /// Maximum number of live frames, the entry frame included.
    pub max_call_depth: usize,
}

pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;
pub const DEFAULT_REGISTER_COUNT: usize = 32;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;
pub const MAX_REGISTER_COUNT: usize = 256;

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            register_count: DEFAULT_REGISTER_COUNT,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl VmConfig {
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Clamped to [`MAX_REGISTER_COUNT`].
    pub fn with_register_count(mut self, count: usize) -> Self {
        self.register_count = count.min(MAX_REGISTER_COUNT);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VmConfig::default();
        assert_eq!(config.max_stack_depth, 1024);
        assert_eq!(config.register_count, 32);
        assert_eq!(config.max_call_depth, 64);
    }

    #[test]
    fn register_count_is_clamped() {
        let config = VmConfig::default().with_register_count(1000);
        assert_eq!(config.register_count, MAX_REGISTER_COUNT);
    }
}
