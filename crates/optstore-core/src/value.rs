//! The value contract every option kind fulfils.
//!
//! The store never interprets option values. It only needs to copy them,
//! compare them and drop them, and it only ever does so between values of
//! the same [`OptionKind`].

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::mem;

/// Runtime description of an option's value type.
#[derive(Clone, Copy)]
pub struct OptionKind {
    name: &'static str,
    type_id: TypeId,
    size: usize,
}

impl OptionKind {
    /// Describe the kind backing values of type `T`.
    pub fn of<T: OptionValue>() -> Self {
        Self {
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: mem::size_of::<T>(),
        }
    }

    /// Name of the underlying Rust type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size in bytes of the inline value representation.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if this kind describes values of type `T`.
    pub fn is<T: OptionValue>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for OptionKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for OptionKind {}

impl fmt::Debug for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionKind")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased option value.
///
/// Implemented for every `Clone + PartialEq + Debug + Send + Sync` type, so
/// plain Rust types can be used as option values directly. `PartialEq` must
/// express value equality: a type whose representation can differ for equal
/// values should wrap itself in a newtype with a suitable `PartialEq`.
/// Owned resources are released by `Drop`.
pub trait OptionValue: Any + Send + Sync + fmt::Debug {
    /// Kind of this value.
    fn kind(&self) -> OptionKind;

    /// Deep copy into a new box.
    fn clone_value(&self) -> Box<dyn OptionValue>;

    /// Value equality. Values of different kinds are never equal.
    fn value_eq(&self, other: &dyn OptionValue) -> bool;

    /// Overwrite `self` with a deep copy of `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src` is of a different kind.
    fn copy_from(&mut self, src: &dyn OptionValue);

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> OptionValue for T
where
    T: Any + Clone + PartialEq + fmt::Debug + Send + Sync,
{
    fn kind(&self) -> OptionKind {
        OptionKind::of::<T>()
    }

    fn clone_value(&self) -> Box<dyn OptionValue> {
        Box::new(self.clone())
    }

    fn value_eq(&self, other: &dyn OptionValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn copy_from(&mut self, src: &dyn OptionValue) {
        match src.as_any().downcast_ref::<T>() {
            Some(src) => self.clone_from(src),
            None => panic!(
                "cannot copy a {} value into a {} option",
                src.kind(),
                type_name::<T>()
            ),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn OptionValue {
    /// Check if the value is of type `T`.
    pub fn is<T: OptionValue>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the value as `T`.
    pub fn downcast_ref<T: OptionValue>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably borrow the value as `T`.
    pub fn downcast_mut<T: OptionValue>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Borrow as `T` where the kind was already checked by a typed handle.
    pub(crate) fn cast<T: OptionValue>(&self) -> &T {
        match self.downcast_ref::<T>() {
            Some(value) => value,
            None => panic!("option holds {} values, not {}", self.kind(), type_name::<T>()),
        }
    }

    pub(crate) fn cast_mut<T: OptionValue>(&mut self) -> &mut T {
        let kind = self.kind();
        match self.downcast_mut::<T>() {
            Some(value) => value,
            None => panic!("option holds {kind} values, not {}", type_name::<T>()),
        }
    }
}
