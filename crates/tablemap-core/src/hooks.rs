//! Lifecycle hooks and the capability set that records which ones a type has.
//!
//! A type declares its hooks once, when its `Table` is built. Dispatch is then a
//! bit test plus one call through a type-erased function; nothing is probed per
//! call.

use std::any::Any;
use std::fmt;

use asupersync::Cx;

use crate::error::{Error, Result};

/// A point in the scan/select/insert/update/delete sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before a row is scanned into the instance.
    BeforeScan,
    /// After a row was scanned into the instance.
    AfterScan,
    /// After a select query finished scanning.
    AfterSelect,
    /// Before an insert query runs.
    BeforeInsert,
    /// After an insert query ran.
    AfterInsert,
    /// Before an update query runs.
    BeforeUpdate,
    /// After an update query ran.
    AfterUpdate,
    /// Before a delete query runs.
    BeforeDelete,
    /// After a delete query ran.
    AfterDelete,
}

impl Hook {
    /// Every hook, in bit order.
    pub const ALL: [Hook; 9] = [
        Hook::BeforeScan,
        Hook::AfterScan,
        Hook::AfterSelect,
        Hook::BeforeInsert,
        Hook::AfterInsert,
        Hook::BeforeUpdate,
        Hook::AfterUpdate,
        Hook::BeforeDelete,
        Hook::AfterDelete,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Name as written in `#[tablemap(hooks(...))]`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Hook::BeforeScan => "before_scan",
            Hook::AfterScan => "after_scan",
            Hook::AfterSelect => "after_select",
            Hook::BeforeInsert => "before_insert",
            Hook::AfterInsert => "after_insert",
            Hook::BeforeUpdate => "before_update",
            Hook::AfterUpdate => "after_update",
            Hook::BeforeDelete => "before_delete",
            Hook::AfterDelete => "after_delete",
        }
    }

    /// Parse an attribute name back into a hook.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Hook::ALL.into_iter().find(|h| h.as_str() == name)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compact bitset of declared hooks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookSet {
    bits: u16,
}

impl HookSet {
    /// No hooks declared.
    #[must_use]
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Build a set from a list of hooks.
    #[must_use]
    pub const fn from_hooks(hooks: &[Hook]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < hooks.len() {
            bits |= hooks[i].bit();
            i += 1;
        }
        Self { bits }
    }

    /// Mark a hook as declared.
    pub fn set(&mut self, hook: Hook) {
        self.bits |= hook.bit();
    }

    /// Check whether a hook is declared.
    #[must_use]
    pub const fn has(&self, hook: Hook) -> bool {
        self.bits & hook.bit() != 0
    }

    /// True if no hook is declared.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterate the declared hooks in bit order.
    pub fn iter(&self) -> impl Iterator<Item = Hook> + '_ {
        Hook::ALL.into_iter().filter(|h| self.has(*h))
    }
}

/// Lifecycle callbacks an entity may implement.
///
/// Every method defaults to `Ok(())`. Implementing a method is not enough: the
/// hook must also be listed in the table's `HookSet` (the derive does this from
/// `#[tablemap(hooks(...))]`), otherwise it is never called.
#[allow(unused_variables)]
pub trait ModelHooks {
    /// Called before a row is scanned into the instance.
    fn before_scan(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called after a row was scanned, when the instance received a value.
    fn after_scan(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called once after a select finished scanning.
    fn after_select(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called before the instance is inserted.
    fn before_insert(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called after the instance was inserted.
    fn after_insert(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called before the instance is updated.
    fn before_update(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called after the instance was updated.
    fn after_update(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called before the instance is deleted.
    fn before_delete(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }

    /// Called after the instance was deleted.
    fn after_delete(&mut self, cx: &Cx) -> Result<()> {
        Ok(())
    }
}

/// Type-erased hook call stored in a `Table`.
pub type HookFn = fn(Hook, &mut dyn Any, &Cx) -> Result<()>;

/// Downcast `instance` to `E` and run one of its hooks.
pub fn dispatch<E: ModelHooks + Any>(hook: Hook, instance: &mut dyn Any, cx: &Cx) -> Result<()> {
    let Some(entity) = instance.downcast_mut::<E>() else {
        return Err(Error::custom(format!(
            "{hook} hook called with an instance that is not {}",
            std::any::type_name::<E>()
        )));
    };
    match hook {
        Hook::BeforeScan => entity.before_scan(cx),
        Hook::AfterScan => entity.after_scan(cx),
        Hook::AfterSelect => entity.after_select(cx),
        Hook::BeforeInsert => entity.before_insert(cx),
        Hook::AfterInsert => entity.after_insert(cx),
        Hook::BeforeUpdate => entity.before_update(cx),
        Hook::AfterUpdate => entity.after_update(cx),
        Hook::BeforeDelete => entity.before_delete(cx),
        Hook::AfterDelete => entity.after_delete(cx),
    }
}
