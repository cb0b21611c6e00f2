use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMObject;

/// Operand stack shared by every frame of a run.
///
/// Bounded: pushing past `max_depth` is a `StackOverflow` fault, popping an
/// empty stack a `StackUnderflow`. Failed operations leave the stack unchanged.
#[derive(Clone, Debug)]
pub struct Stack {
    items: Vec<VMObject>,
    max_depth: usize,
}

impl Stack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            items: Vec::new(),
            max_depth,
        }
    }

    pub fn push(&mut self, value: VMObject) -> Result<(), VMError> {
        if self.items.len() >= self.max_depth {
            return Err(VMError::StackOverflow {
                max: self.max_depth,
            });
        }
        self.items.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<VMObject, VMError> {
        self.items.pop().ok_or(VMError::StackUnderflow)
    }

    /// Item `depth` places below the top (0 = top).
    pub fn peek(&self, depth: usize) -> Result<&VMObject, VMError> {
        self.items
            .len()
            .checked_sub(depth + 1)
            .and_then(|idx| self.items.get(idx))
            .ok_or(VMError::StackUnderflow)
    }

    /// Fails with `StackUnderflow` unless at least `n` items are present.
    pub fn require(&self, n: usize) -> Result<(), VMError> {
        if self.items.len() < n {
            return Err(VMError::StackUnderflow);
        }
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), VMError> {
        self.require(2)?;
        let len = self.items.len();
        self.items.swap(len - 1, len - 2);
        Ok(())
    }

    /// Replaces the top `n` items with `value`.
    pub fn replace_top(&mut self, n: usize, value: VMObject) -> Result<(), VMError> {
        self.require(n)?;
        if n == 0 && self.items.len() >= self.max_depth {
            return Err(VMError::StackOverflow {
                max: self.max_depth,
            });
        }
        self.items.truncate(self.items.len() - n);
        self.items.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Items bottom to top.
    pub fn as_slice(&self) -> &[VMObject] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<VMObject> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> VMObject {
        VMObject::from(n)
    }

    #[test]
    fn pop_empty_underflows() {
        let mut stack = Stack::new(4);
        assert_eq!(stack.pop(), Err(VMError::StackUnderflow));
        assert_eq!(stack.peek(0), Err(VMError::StackUnderflow));
    }

    #[test]
    fn push_past_max_overflows() {
        let mut stack = Stack::new(2);
        stack.push(num(1)).unwrap();
        stack.push(num(2)).unwrap();
        assert_eq!(stack.push(num(3)), Err(VMError::StackOverflow { max: 2 }));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn peek_by_depth() {
        let mut stack = Stack::new(8);
        for n in 1..=3 {
            stack.push(num(n)).unwrap();
        }
        assert_eq!(stack.peek(0).unwrap(), &num(3));
        assert_eq!(stack.peek(2).unwrap(), &num(1));
        assert!(stack.peek(3).is_err());
    }

    #[test]
    fn swap_needs_two_items() {
        let mut stack = Stack::new(8);
        stack.push(num(1)).unwrap();
        assert_eq!(stack.swap(), Err(VMError::StackUnderflow));
        stack.push(num(2)).unwrap();
        stack.swap().unwrap();
        assert_eq!(stack.as_slice(), &[num(2), num(1)]);
    }

    #[test]
    fn replace_top_is_all_or_nothing() {
        let mut stack = Stack::new(8);
        stack.push(num(1)).unwrap();
        assert_eq!(stack.replace_top(2, num(9)), Err(VMError::StackUnderflow));
        assert_eq!(stack.as_slice(), &[num(1)]);

        stack.push(num(2)).unwrap();
        stack.replace_top(2, num(3)).unwrap();
        assert_eq!(stack.into_vec(), vec![num(3)]);
    }
}
