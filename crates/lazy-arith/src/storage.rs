//! Operand storage views.
//!
//! A leaf value is held in one of three views: an owned value, a mutable
//! reference or a read-only reference. Conversions only run
//! value → mutable reference → read-only reference, never backwards.
//!
//! Expression nodes only ever keep `Owned` or `ReadRef` leaves. A `MutRef`
//! handed to a node is demoted to `ReadRef` when the node is built, so a tree
//! never holds a writable alias into a named value.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Value,
    MutRef,
    ReadRef,
}

pub enum Stored<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
    ReadRef(&'a T),
}

impl<'a, T> Stored<'a, T> {
    pub fn class(&self) -> StorageClass {
        match self {
            Stored::Owned(_) => StorageClass::Value,
            Stored::MutRef(_) => StorageClass::MutRef,
            Stored::ReadRef(_) => StorageClass::ReadRef,
        }
    }

    #[inline(always)]
    pub fn get(&self) -> &T {
        match self {
            Stored::Owned(value) => value,
            Stored::MutRef(value) => value,
            Stored::ReadRef(value) => value,
        }
    }

    /// Writable access, available for the owning and mutable views only.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Stored::Owned(value) => Some(value),
            Stored::MutRef(value) => Some(value),
            Stored::ReadRef(_) => None,
        }
    }

    /// Value → mutable reference edge.
    pub fn as_mut_ref(&mut self) -> Option<Stored<'_, T>> {
        self.get_mut().map(Stored::MutRef)
    }

    /// Mutable reference → read-only reference edge. Owned values stay owned.
    pub fn into_read(self) -> Stored<'a, T> {
        match self {
            Stored::MutRef(value) => Stored::ReadRef(value),
            other => other,
        }
    }

    /// A read-only view borrowing from `self`, without copying.
    pub fn as_read(&self) -> Stored<'_, T> {
        Stored::ReadRef(self.get())
    }

    pub fn into_owned(self) -> T
    where
        T: Clone,
    {
        match self {
            Stored::Owned(value) => value,
            Stored::MutRef(value) => value.clone(),
            Stored::ReadRef(value) => value.clone(),
        }
    }
}

impl<T> From<T> for Stored<'_, T> {
    fn from(value: T) -> Self {
        Stored::Owned(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Stored<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stored::Owned(value) => f.debug_tuple("Owned").field(value).finish(),
            Stored::MutRef(value) => f.debug_tuple("MutRef").field(value).finish(),
            Stored::ReadRef(value) => f.debug_tuple("ReadRef").field(value).finish(),
        }
    }
}
