use std::rc::Rc;

/// Identity key of a shared allocation, stable for as long as the allocation lives.
pub(crate) fn ptr_key<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc).cast::<()>().addr()
}
