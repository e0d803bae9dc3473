use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a stimulus name or display text and return its dense id.
///
/// Ids are stable for the lifetime of the process, so renderers can index
/// pixmap caches by them.
pub fn intern(s: &str) -> usize {
    let atom = Atom::from(s);
    let mut v = INTERNER.write().unwrap_or_else(PoisonError::into_inner);
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

/// Id of an already interned string, without interning it.
pub fn lookup_id(s: &str) -> Option<usize> {
    let atom = Atom::from(s);
    INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .position(|a| *a == atom)
}

/// Current count of unique strings
pub fn interned_count() -> usize {
    INTERNER.read().unwrap_or_else(PoisonError::into_inner).len()
}

pub fn resolve(id: usize) -> Option<Atom> {
    INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned()
}
