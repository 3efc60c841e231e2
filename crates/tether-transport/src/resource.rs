// ============================================
// File: crates/tether-transport/src/resource.rs
// ============================================
//! # Session Resource Registry
//!
//! ## Creation Reason
//! Layers allocate session state (receive buffers, redirect targets, the
//! socket itself) during `connect` and must release all of it in `close`,
//! otherwise every reconnect cycle leaks. Declaring those fields once, with
//! their init and cleanup functions, turns release into one idempotent call.
//!
//! ## Main Functionality
//! - `ResourceSlot`: a field that can hold a live allocation (`Option<T>`)
//! - `ResourceEntry`: name + slot accessor + optional init / cleanup + flag
//! - `ResourceRegistry`: ordered entries with bulk `init` and `cleanup`
//!
//! ## Lifecycle
//! ```text
//!   construct layer ──► entries declared, nothing allocated
//!         │
//!   connect ─► init(ctx, cfg) ─► entries with init fn allocated
//!         │         │
//!         │         └─ failure at k ─► cleanup(all) ─► Err(Allocation)
//!         │
//!   manual allocation ─► mark_initialized(name)
//!         │
//!   close / destroy ─► cleanup(ctx) ─► every slot empty (idempotent)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `initialized == true` iff the slot holds a live allocation
//! - `cleanup` never fails and may be called any number of times
//! - Entries without an init fn are manual: allocate, then `mark_initialized`
//! - Configuration that survives reconnects does NOT belong here
//!
//! ## Last Modified
//! v0.1.0 - Initial registry implementation

use std::fmt;

use tracing::{debug, error, warn};

use crate::error::{Result, TransportError};

// ============================================
// ResourceSlot
// ============================================

/// A context field that may hold a live allocation.
pub trait ResourceSlot: Send {
    /// Returns `true` if the slot currently holds a live allocation.
    fn is_live(&self) -> bool;

    /// Drops the allocation, leaving the slot empty.
    fn release(&mut self);
}

impl<T: Send> ResourceSlot for Option<T> {
    fn is_live(&self) -> bool {
        self.is_some()
    }

    fn release(&mut self) {
        drop(self.take());
    }
}

/// Locates a slot inside the session context `C`.
pub type SlotFn<C> = fn(&mut C) -> &mut dyn ResourceSlot;

/// Allocates the resource into its slot.
pub type InitFn<C, Cfg> = fn(&mut C, &Cfg) -> Result<()>;

/// Releases the resource held by a slot.
pub type CleanupFn = fn(&mut dyn ResourceSlot);

/// Default cleanup: drop whatever the slot holds.
pub fn release_slot(slot: &mut dyn ResourceSlot) {
    slot.release();
}

/// Allocates a zero-filled byte buffer of exactly `size` bytes, reporting
/// allocation failure instead of aborting.
///
/// # Errors
/// Returns `Allocation` if the memory cannot be reserved.
pub fn try_alloc_bytes(resource: &str, size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| TransportError::allocation(resource, size))?;
    buf.resize(size, 0);
    Ok(buf)
}

// ============================================
// ResourceEntry
// ============================================

/// Declarative descriptor of one session resource.
pub struct ResourceEntry<C, Cfg = ()> {
    name: &'static str,
    slot: SlotFn<C>,
    init: Option<InitFn<C, Cfg>>,
    cleanup: Option<CleanupFn>,
    initialized: bool,
}

impl<C, Cfg> ResourceEntry<C, Cfg> {
    /// Declares a manually initialised entry released with [`release_slot`].
    #[must_use]
    pub fn new(name: &'static str, slot: SlotFn<C>) -> Self {
        Self {
            name,
            slot,
            init: None,
            cleanup: Some(release_slot),
            initialized: false,
        }
    }

    /// Sets the init function called by [`ResourceRegistry::init`].
    #[must_use]
    pub fn with_init(mut self, init: InitFn<C, Cfg>) -> Self {
        self.init = Some(init);
        self
    }

    /// Replaces the cleanup function.
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: CleanupFn) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    /// Removes the cleanup function. Cleanup then warns and drops the slot.
    #[must_use]
    pub fn without_cleanup(mut self) -> Self {
        self.cleanup = None;
        self
    }

    /// Returns the entry name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` while the entry holds a live allocation.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns `true` if the entry is allocated by `init`.
    #[must_use]
    pub const fn has_init(&self) -> bool {
        self.init.is_some()
    }

    fn release(&mut self, ctx: &mut C) {
        if !self.initialized {
            return;
        }
        let slot = (self.slot)(ctx);
        match self.cleanup {
            Some(cleanup) => cleanup(slot),
            None => {
                warn!(resource = self.name, "No cleanup function registered, dropping slot");
                slot.release();
            }
        }
        if slot.is_live() {
            // A custom cleanup left something behind; the flag must not lie.
            warn!(resource = self.name, "Cleanup left slot populated, dropping it");
            slot.release();
        }
        self.initialized = false;
        debug!(resource = self.name, "Released session resource");
    }
}

impl<C, Cfg> fmt::Debug for ResourceEntry<C, Cfg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("name", &self.name)
            .field("has_init", &self.init.is_some())
            .field("has_cleanup", &self.cleanup.is_some())
            .field("initialized", &self.initialized)
            .finish()
    }
}

// ============================================
// ResourceRegistry
// ============================================

/// Ordered set of session resources belonging to one layer.
///
/// The registry does not own the resources themselves; they live in the
/// layer's session context `C` and are reached through each entry's slot
/// accessor. Keeping the two apart lets a layer borrow both at once.
///
/// # Example
/// ```
/// use tether_transport::resource::{ResourceEntry, ResourceRegistry, try_alloc_bytes};
///
/// #[derive(Default)]
/// struct Session {
///     buffer: Option<Vec<u8>>,
///     redirect: Option<String>,
/// }
///
/// let mut session = Session::default();
/// let mut resources: ResourceRegistry<Session, usize> = ResourceRegistry::new()
///     .with(ResourceEntry::new("buffer", |s: &mut Session| &mut s.buffer)
///         .with_init(|s, size| {
///             s.buffer = Some(try_alloc_bytes("buffer", *size)?);
///             Ok(())
///         }))
///     .with(ResourceEntry::new("redirect", |s: &mut Session| &mut s.redirect));
///
/// resources.init(&mut session, &1024).unwrap();
/// assert!(session.buffer.is_some());
///
/// session.redirect = Some("other.example.com".into());
/// resources.mark_initialized(&mut session, "redirect").unwrap();
///
/// resources.cleanup(&mut session);
/// resources.cleanup(&mut session);
/// assert!(session.buffer.is_none() && session.redirect.is_none());
/// ```
pub struct ResourceRegistry<C, Cfg = ()> {
    entries: Vec<ResourceEntry<C, Cfg>>,
}

impl<C, Cfg> ResourceRegistry<C, Cfg> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry (builder style). Declaration order is init order.
    #[must_use]
    pub fn with(mut self, entry: ResourceEntry<C, Cfg>) -> Self {
        self.register(entry);
        self
    }

    /// Appends an entry.
    pub fn register(&mut self, entry: ResourceEntry<C, Cfg>) {
        self.entries.push(entry);
    }

    /// Allocates every entry that has an init function and is not live yet.
    ///
    /// Entries are processed in declaration order. If any init function
    /// fails, every entry initialised so far (from this or an earlier call)
    /// is released before the error is returned, so the caller never sees
    /// a half-initialised set.
    ///
    /// # Errors
    /// Returns the failing init function's error (typically `Allocation`).
    pub fn init(&mut self, ctx: &mut C, cfg: &Cfg) -> Result<()> {
        for idx in 0..self.entries.len() {
            let entry = &mut self.entries[idx];
            let Some(init) = entry.init else {
                continue;
            };
            if entry.initialized {
                continue;
            }

            if let Err(e) = init(ctx, cfg) {
                error!(resource = entry.name, error = %e, "Failed to initialize session resource");
                // The failing init may have partially filled its own slot.
                (entry.slot)(ctx).release();
                self.cleanup(ctx);
                return Err(e);
            }

            entry.initialized = true;
            debug!(resource = entry.name, "Initialized session resource");
        }
        Ok(())
    }

    /// Releases every live entry. Never fails; safe to repeat.
    pub fn cleanup(&mut self, ctx: &mut C) {
        for entry in &mut self.entries {
            entry.release(ctx);
        }
    }

    /// Records that a manually allocated entry is now live.
    ///
    /// # Errors
    /// - `InvalidArgument` if no entry has this name
    /// - `InvalidArgument` if the slot is empty
    pub fn mark_initialized(&mut self, ctx: &mut C, name: &str) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| TransportError::invalid_argument(format!("unknown resource '{name}'")))?;

        if !(entry.slot)(ctx).is_live() {
            return Err(TransportError::invalid_argument(format!(
                "resource '{name}' marked initialized while its slot is empty"
            )));
        }

        entry.initialized = true;
        debug!(resource = entry.name, "Manually initialized session resource");
        Ok(())
    }

    /// Releases one entry by name, leaving the others untouched.
    ///
    /// Unknown names are ignored.
    pub fn release(&mut self, ctx: &mut C, name: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.release(ctx);
        }
    }

    /// Returns `true` if the named entry is live.
    #[must_use]
    pub fn is_initialized(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.name == name && e.initialized)
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.initialized).count()
    }

    /// Returns the declared entry names in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Returns the number of declared entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C, Cfg> Default for ResourceRegistry<C, Cfg> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, Cfg> fmt::Debug for ResourceRegistry<C, Cfg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Session {
        first: Option<Vec<u8>>,
        second: Option<String>,
        third: Option<Vec<u8>>,
        manual: Option<String>,
        fail_second: bool,
        init_calls: usize,
    }

    fn init_first(s: &mut Session, size: &usize) -> Result<()> {
        s.init_calls += 1;
        s.first = Some(try_alloc_bytes("first", *size)?);
        Ok(())
    }

    fn init_second(s: &mut Session, _: &usize) -> Result<()> {
        s.init_calls += 1;
        if s.fail_second {
            return Err(TransportError::allocation("second", 64));
        }
        s.second = Some("second".into());
        Ok(())
    }

    fn init_third(s: &mut Session, size: &usize) -> Result<()> {
        s.init_calls += 1;
        s.third = Some(vec![0; *size]);
        Ok(())
    }

    fn registry() -> ResourceRegistry<Session, usize> {
        ResourceRegistry::new()
            .with(ResourceEntry::new("first", |s: &mut Session| &mut s.first).with_init(init_first))
            .with(ResourceEntry::new("second", |s: &mut Session| &mut s.second).with_init(init_second))
            .with(ResourceEntry::new("third", |s: &mut Session| &mut s.third).with_init(init_third))
            .with(ResourceEntry::new("manual", |s: &mut Session| &mut s.manual))
    }

    #[test]
    fn test_init_allocates_in_order() {
        let mut session = Session::default();
        let mut resources = registry();

        resources.init(&mut session, &16).unwrap();

        assert_eq!(session.first.as_ref().map(Vec::len), Some(16));
        assert_eq!(session.second.as_deref(), Some("second"));
        assert!(session.third.is_some());
        assert!(session.manual.is_none());
        assert_eq!(resources.live_count(), 3);
        assert!(!resources.is_initialized("manual"));
    }

    #[test]
    fn test_init_skips_live_entries() {
        let mut session = Session::default();
        let mut resources = registry();

        resources.init(&mut session, &8).unwrap();
        resources.init(&mut session, &8).unwrap();

        assert_eq!(session.init_calls, 3);
    }

    #[test]
    fn test_rollback_on_partial_failure() {
        let mut session = Session {
            fail_second: true,
            ..Session::default()
        };
        let mut resources = registry();

        let err = resources.init(&mut session, &32).unwrap_err();

        assert!(err.is_allocation_failure());
        // Entry 1 rolled back, entries 2..n never initialised
        assert!(session.first.is_none());
        assert!(session.second.is_none());
        assert!(session.third.is_none());
        assert_eq!(resources.live_count(), 0);
        assert_eq!(session.init_calls, 2);
    }

    #[test]
    fn test_rollback_includes_manual_entries() {
        let mut session = Session::default();
        let mut resources = registry();

        session.manual = Some("redirect".into());
        resources.mark_initialized(&mut session, "manual").unwrap();

        session.fail_second = true;
        assert!(resources.init(&mut session, &4).is_err());
        assert!(session.manual.is_none());
        assert!(!resources.is_initialized("manual"));
    }

    #[test]
    fn test_cleanup_idempotent() {
        let mut session = Session::default();
        let mut resources = registry();
        resources.init(&mut session, &8).unwrap();

        for _ in 0..5 {
            resources.cleanup(&mut session);
            assert!(session.first.is_none());
            assert!(session.second.is_none());
            assert!(session.third.is_none());
            assert_eq!(resources.live_count(), 0);
        }
    }

    #[test]
    fn test_cleanup_never_initialized() {
        let mut session = Session::default();
        let mut resources = registry();

        resources.cleanup(&mut session);
        assert_eq!(resources.live_count(), 0);
    }

    #[test]
    fn test_mark_initialized_validation() {
        let mut session = Session::default();
        let mut resources = registry();

        assert!(resources.mark_initialized(&mut session, "missing").is_err());
        assert!(resources.mark_initialized(&mut session, "manual").is_err());

        session.manual = Some("ok".into());
        resources.mark_initialized(&mut session, "manual").unwrap();
        assert!(resources.is_initialized("manual"));

        resources.cleanup(&mut session);
        assert!(session.manual.is_none());
    }

    #[test]
    fn test_missing_cleanup_still_clears() {
        let mut session = Session::default();
        let mut resources: ResourceRegistry<Session, usize> = ResourceRegistry::new().with(
            ResourceEntry::new("manual", |s: &mut Session| &mut s.manual).without_cleanup(),
        );

        session.manual = Some("orphan".into());
        resources.mark_initialized(&mut session, "manual").unwrap();
        resources.cleanup(&mut session);

        assert!(session.manual.is_none());
        assert!(!resources.is_initialized("manual"));
    }

    #[test]
    fn test_release_single_entry() {
        let mut session = Session::default();
        let mut resources = registry();
        resources.init(&mut session, &8).unwrap();

        resources.release(&mut session, "second");

        assert!(session.second.is_none());
        assert!(session.first.is_some());
        assert_eq!(resources.live_count(), 2);
    }

    #[test]
    fn test_try_alloc_bytes_failure() {
        let err = try_alloc_bytes("huge", usize::MAX).unwrap_err();
        assert!(err.is_allocation_failure());
    }

    #[test]
    fn test_names_in_declaration_order() {
        let resources = registry();
        let names: Vec<_> = resources.names().collect();
        assert_eq!(names, ["first", "second", "third", "manual"]);
        assert_eq!(resources.len(), 4);
    }
}
