use std::ops::{Deref, DerefMut};

pub(crate) trait NullCheck {
    fn is_null(&self) -> bool;
}

impl<T> NullCheck for *const T {
    fn is_null(&self) -> bool {
        (*self).is_null()
    }
}

impl<T> NullCheck for *mut T {
    fn is_null(&self) -> bool {
        (*self as *const T).is_null()
    }
}

/// Owning box for a sqlite handle, released by `dealloc` unless null.
#[derive(Debug)]
pub(crate) struct CBox<T: NullCheck> {
    pub(crate) ptr: T,
    dealloc: fn(T),
}

impl<T: NullCheck> CBox<T> {
    pub fn new(ptr: T, dealloc: fn(T)) -> Self {
        Self { ptr, dealloc }
    }
}

impl<T: NullCheck + Copy> CBox<T> {
    /// Non owning copy of the handle, used to move it into a blocking task.
    pub fn borrowed(&self) -> CBox<T> {
        CBox::new(self.ptr, |_| {})
    }
}

impl<T: NullCheck> Drop for CBox<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                (self.dealloc)(std::ptr::read(&self.ptr as *const T));
            }
        }
    }
}

impl<T: NullCheck> Deref for CBox<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.ptr
    }
}

impl<T: NullCheck> DerefMut for CBox<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ptr
    }
}

unsafe impl<T: NullCheck> Send for CBox<T> {}
unsafe impl<T: NullCheck> Sync for CBox<T> {}

#[cfg(test)]
mod tests {
    use super::CBox;
    use std::{
        ptr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn released_once_unless_null() {
        static RELEASED: AtomicUsize = AtomicUsize::new(0);
        let mut v = 123;
        {
            let ptr = CBox::new(ptr::null_mut::<i32>(), |_| {
                RELEASED.fetch_add(1, Ordering::Relaxed);
            });
            assert!(ptr.is_null());
        }
        assert_eq!(RELEASED.load(Ordering::Relaxed), 0);
        {
            let ptr = CBox::new(&mut v as *mut i32, |_| {
                RELEASED.fetch_add(1, Ordering::Relaxed);
            });
            {
                let borrowed = ptr.borrowed();
                assert_eq!(unsafe { **borrowed }, 123);
            }
            assert_eq!(RELEASED.load(Ordering::Relaxed), 0);
        }
        assert_eq!(RELEASED.load(Ordering::Relaxed), 1);
    }
}
