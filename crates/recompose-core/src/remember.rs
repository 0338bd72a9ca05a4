use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Shared handle to a value remembered by a composition.
///
/// The slot table keeps one handle and every `remember` call at the same
/// position hands out a clone of it, so mutations are visible on the next
/// pass. The value is dropped once the owning slot is removed and no handle
/// clone survives.
pub struct Owned<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for Owned<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Owned<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Replaces the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.inner.replace(value)
    }

    /// Whether both handles point at the same remembered value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Owned<T> {
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(value) => f.debug_tuple("Owned").field(&*value).finish(),
            Err(_) => f.write_str("Owned(<borrowed>)"),
        }
    }
}

/// Type-erased handle stored in a slot for a remembered object.
///
/// Equality is identity: two handles are equal only when they wrap the same
/// remembered value, however many times it was wrapped.
#[derive(Clone)]
pub struct RememberedHandle {
    inner: Rc<dyn Any>,
    value: *const (),
    type_name: &'static str,
}

impl RememberedHandle {
    pub(crate) fn new<T: 'static>(owned: Owned<T>) -> Self {
        Self {
            value: Rc::as_ptr(&owned.inner).cast(),
            inner: Rc::new(owned),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Recovers the typed handle when the remembered value is a `T`.
    pub fn downcast<T: 'static>(&self) -> Option<Owned<T>> {
        self.inner.downcast_ref::<Owned<T>>().cloned()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.value, other.value)
    }
}

impl fmt::Debug for RememberedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remembered<{}>", self.type_name)
    }
}
