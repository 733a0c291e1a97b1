use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::registry::{Registered, Registry};
use super::{Entity, Handle};

/// Deferred-binding handle to an entity, by natural key.
///
/// Extraction routines emit `Ref`s for entities that may not have been scraped
/// yet; `resolve` binds the cell to the canonical instance once it exists.
/// Serialization always yields the raw key, never the target's structure, so a
/// shared entity is never duplicated inside its referrers' dumps.
pub enum Ref<T: Entity> {
    Unresolved(T::Key),
    Resolved(Handle<T>),
}

impl<T: Entity> Ref<T> {
    /// Reference by raw key, exactly as scraped.
    pub fn of(key: impl Into<T::Key>) -> Self {
        Ref::Unresolved(key.into())
    }

    /// The natural key, whether or not the cell is resolved. This is the
    /// serialization, equality, and hashing hook.
    pub fn key(&self) -> T::Key {
        match self {
            Ref::Unresolved(k) => k.clone(),
            Ref::Resolved(h) => h.borrow().key(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Ref::Resolved(_))
    }

    /// The bound entity, if the cell has been resolved. Does not touch the
    /// registry; use after a resolution pass (e.g. during export).
    pub fn bound(&self) -> Option<Handle<T>> {
        match self {
            Ref::Unresolved(_) => None,
            Ref::Resolved(h) => Some(Rc::clone(h)),
        }
    }

    /// Like `bound`, but an unresolved cell is an error.
    pub fn require(&self) -> Result<Handle<T>, Error> {
        self.bound().ok_or_else(|| Error::UnresolvedReference {
            kind: T::kind(),
            key: self.key().to_string(),
        })
    }
}

impl<T: Registered> Ref<T> {
    /// Bind to the canonical instance via registry lookup. Idempotent: an
    /// already-resolved cell reports success without a lookup. Failure leaves
    /// the raw key untouched (the target may not have been scraped yet).
    pub fn resolve(&mut self, reg: &Registry) -> bool {
        let key = match self {
            Ref::Resolved(_) => return true,
            Ref::Unresolved(k) => k.clone(),
        };
        match reg.lookup::<T>(&key) {
            Some(handle) => {
                *self = Ref::Resolved(handle);
                true
            }
            None => false,
        }
    }

    /// Resolve-then-bind. `UnresolvedReference` if the target never
    /// materialized.
    pub fn deref(&mut self, reg: &Registry) -> Result<Handle<T>, Error> {
        self.resolve(reg);
        self.require()
    }
}

impl<T: Entity> Clone for Ref<T> {
    fn clone(&self) -> Self {
        match self {
            Ref::Unresolved(k) => Ref::Unresolved(k.clone()),
            Ref::Resolved(h) => Ref::Resolved(Rc::clone(h)),
        }
    }
}

impl<T: Entity> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_resolved() { "resolved" } else { "raw" };
        write!(f, "Ref<{}>({:?}, {})", T::kind(), self.key(), state)
    }
}

// The same logical reference may appear raw in one record and resolved in
// another; equality and hashing go through the derived key so the two compare
// equal.
impl<T: Entity> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Entity> Eq for Ref<T> {}

impl<T: Entity> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<T: Entity> Serialize for Ref<T>
where
    T::Key: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.key().serialize(serializer)
    }
}

impl<'de, T: Entity> Deserialize<'de> for Ref<T>
where
    T::Key: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Loading always starts raw; resolution stays lazy.
        Ok(Ref::Unresolved(T::Key::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entities::Disciplina;

    fn seeded() -> Registry {
        let mut reg = Registry::new();
        reg.get_or_create(Disciplina {
            cod: "GCC123".into(),
            nome: "Estruturas de Dados".into(),
            creditos: 4,
            ..Default::default()
        });
        reg
    }

    #[test]
    fn resolves_existing_key_round_trip() {
        let reg = seeded();
        let mut r: Ref<Disciplina> = Ref::of("GCC123");
        assert!(r.resolve(&reg));
        let d = r.deref(&reg).unwrap();
        assert_eq!(d.borrow().key(), "GCC123");
    }

    #[test]
    fn resolve_is_idempotent() {
        let reg = seeded();
        let mut r: Ref<Disciplina> = Ref::of("GCC123");
        assert!(r.resolve(&reg));
        assert!(r.resolve(&reg));
        assert!(r.is_resolved());
    }

    #[test]
    fn unresolved_reference_surfaces() {
        let reg = seeded();
        let mut r: Ref<Disciplina> = Ref::of("NONEXISTENT");
        assert!(!r.resolve(&reg));
        let err = r.deref(&reg).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { ref key, .. } if key == "NONEXISTENT"));
        // Failure leaves the raw key serializable.
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            serde_json::json!("NONEXISTENT")
        );
    }

    #[test]
    fn serializes_key_even_when_resolved() {
        let reg = seeded();
        let mut r: Ref<Disciplina> = Ref::of("GCC123");
        r.resolve(&reg);
        assert_eq!(serde_json::to_value(&r).unwrap(), serde_json::json!("GCC123"));
    }

    #[test]
    fn equality_spans_raw_and_resolved() {
        let reg = seeded();
        let raw: Ref<Disciplina> = Ref::of("GCC123");
        let mut resolved: Ref<Disciplina> = Ref::of("GCC123");
        resolved.resolve(&reg);
        assert_eq!(raw, resolved);
    }

    #[test]
    fn deserializes_as_raw_key() {
        let r: Ref<Disciplina> = serde_json::from_str("\"GCC123\"").unwrap();
        assert!(!r.is_resolved());
        assert_eq!(r.key(), "GCC123");
    }
}
