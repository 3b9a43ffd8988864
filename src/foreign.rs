//! Foreign reference capabilities and the owning handle built on them.
//!
//! A [`ForeignRefs`] implementation is the store's only window into the
//! runtime that actually owns the referenced objects: it acquires an owned
//! reference from a caller-supplied value, optionally aliases an owned
//! reference, and releases one. [`Owned`] pairs a raw reference with the
//! capability that minted it and releases it exactly once on drop; the only
//! other way out is [`Owned::into_raw`], which hands the obligation to the
//! caller.

use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use std::sync::Arc;

/// Acquire/alias/release capability of a foreign reference system.
///
/// For a JNI boundary `Value` is the caller's local reference, `Raw` a
/// global reference, `acquire` and `alias` wrap `NewGlobalRef`, and
/// `release` wraps `DeleteGlobalRef`.
pub trait ForeignRefs: Send + Sync + 'static {
    /// What the caller hands in. The caller keeps it; the store only
    /// acquires a reference of its own.
    type Value: ?Sized;

    /// An owned reference. Must be released exactly once. Shared between
    /// threads while concurrent readers alias it.
    type Raw: Send + Sync + 'static;

    /// Whether `value` is the foreign system's null.
    fn is_null(&self, value: &Self::Value) -> bool {
        let _ = value;
        false
    }

    /// Take a new owned reference to the object behind `value`.
    fn acquire(&self, value: &Self::Value) -> Option<Self::Raw>;

    /// Take a second, independently releasable reference to the object
    /// behind `raw`.
    fn alias(&self, raw: &Self::Raw) -> Option<Self::Raw>;

    /// Give an owned reference back to the foreign system.
    fn release(&self, raw: Self::Raw);
}

/// An owned foreign reference. Dropping it releases the reference.
pub struct Owned<R: ForeignRefs> {
    raw: ManuallyDrop<R::Raw>,
    refs: Arc<R>,
}

impl<R: ForeignRefs> Owned<R> {
    /// Acquire a new owned reference to `value`.
    pub fn acquire(refs: &Arc<R>, value: &R::Value) -> Option<Self> {
        let raw = refs.acquire(value)?;
        Some(Self::adopt(refs.clone(), raw))
    }

    /// Take over the release obligation for an already-owned `raw`.
    pub fn adopt(refs: Arc<R>, raw: R::Raw) -> Self {
        Self {
            raw: ManuallyDrop::new(raw),
            refs,
        }
    }

    /// Mint an independent owned reference to the same object.
    pub fn alias(&self) -> Option<Self> {
        let raw = self.refs.alias(&self.raw)?;
        Some(Self::adopt(self.refs.clone(), raw))
    }

    pub fn raw(&self) -> &R::Raw {
        &self.raw
    }

    pub fn refs(&self) -> &Arc<R> {
        &self.refs
    }

    /// Hand the reference out without releasing it. The caller becomes
    /// responsible for releasing it through the same foreign system.
    pub fn into_raw(self) -> R::Raw {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so each field is moved out once.
        unsafe {
            drop(core::ptr::read(&this.refs));
            ManuallyDrop::take(&mut this.raw)
        }
    }
}

impl<R: ForeignRefs> Drop for Owned<R> {
    fn drop(&mut self) {
        // SAFETY: `raw` is taken only here and in `into_raw`, which skips Drop.
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.refs.release(raw);
    }
}

impl<R> fmt::Debug for Owned<R>
where
    R: ForeignRefs,
    R::Raw: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&*self.raw).finish()
    }
}

/// In-process reference system over `Arc<T>`: acquiring and aliasing clone
/// the `Arc`, releasing drops it. Useful where the "foreign" objects are
/// plain Rust values shared between threads.
pub struct ArcRefs<T> {
    _pd: PhantomData<fn() -> T>,
}

impl<T> ArcRefs<T> {
    pub fn new() -> Self {
        Self { _pd: PhantomData }
    }
}

impl<T> Default for ArcRefs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ArcRefs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArcRefs")
    }
}

impl<T: Send + Sync + 'static> ForeignRefs for ArcRefs<T> {
    type Value = Arc<T>;
    type Raw = Arc<T>;

    #[inline]
    fn acquire(&self, value: &Arc<T>) -> Option<Arc<T>> {
        Some(Arc::clone(value))
    }

    #[inline]
    fn alias(&self, raw: &Arc<T>) -> Option<Arc<T>> {
        Some(Arc::clone(raw))
    }

    #[inline]
    fn release(&self, raw: Arc<T>) {
        drop(raw);
    }
}
