//! visitor pattern helpers
//!
//! Rewrites of the configuration (such as the stack name suffix) are written as a [VisitMut] over
//! strings and applied to everything that implements [VisitStringsMut].
mod visit_strings;

/// Visitor that visits its subjects mutably
pub trait VisitMut<T> {
    fn visit_mut(&mut self, value: &mut T);
}

// blanket impl for FnMut
impl<T, F> VisitMut<T> for F
where
    F: FnMut(&mut T),
{
    fn visit_mut(&mut self, value: &mut T) {
        self(value)
    }
}

/// Recursively visit all parameter strings mutably
pub trait VisitStringsMut {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<String>);
}
