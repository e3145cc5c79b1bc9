use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::buffer::{NetBuffer, NetReader};
use crate::error::BufferError;
use crate::value::NetValue;

/// Type-erased view of a replicated variable, as stored by its owning object.
pub trait ReplicatedVariable: Send + Sync {
    fn is_dirty(&self) -> bool;
    fn clear_dirty(&self);
    /// Clears the flag and returns whether it was set.
    fn take_dirty(&self) -> bool;
    fn mark_dirty(&self);
    fn serialize(&self, buf: &mut NetBuffer) -> Result<(), BufferError>;
    /// Overwrites the value from the wire without marking it dirty.
    fn deserialize(&self, reader: &mut NetReader<'_>) -> Result<(), BufferError>;
}

pub type SharedVariable = Arc<dyn ReplicatedVariable>;

pub(crate) fn same_variable(a: &SharedVariable, b: &SharedVariable) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct VariableCell<T> {
    value: Mutex<T>,
    dirty: AtomicBool,
}

impl<T: NetValue> ReplicatedVariable for VariableCell<T> {
    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn serialize(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        self.value.lock().write(buf)
    }

    fn deserialize(&self, reader: &mut NetReader<'_>) -> Result<(), BufferError> {
        let value = T::read(reader)?;
        *self.value.lock() = value;
        Ok(())
    }
}

/// A single replicated value with a dirty flag.
///
/// Cloning yields another handle to the same variable. New variables start
/// dirty so the first tick after a spawn carries the full state.
pub struct NetworkVariable<T> {
    cell: Arc<VariableCell<T>>,
}

impl<T> Clone for NetworkVariable<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: NetValue + fmt::Debug> fmt::Debug for NetworkVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkVariable")
            .field("value", &*self.cell.value.lock())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl<T: NetValue + Default> Default for NetworkVariable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: NetValue> NetworkVariable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            cell: Arc::new(VariableCell {
                value: Mutex::new(initial),
                dirty: AtomicBool::new(true),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.cell.value.lock().clone()
    }

    /// Marks the variable dirty only when `value` differs from the current one.
    pub fn set(&self, value: T) {
        let mut current = self.cell.value.lock();
        if current.same(&value) {
            return;
        }
        *current = value;
        self.cell.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.cell.is_dirty()
    }

    pub fn clear_dirty(&self) {
        self.cell.clear_dirty();
    }

    pub fn serialize(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        self.cell.serialize(buf)
    }

    pub fn deserialize(&self, reader: &mut NetReader<'_>) -> Result<(), BufferError> {
        self.cell.deserialize(reader)
    }

    pub fn shared(&self) -> SharedVariable {
        self.cell.clone()
    }
}
