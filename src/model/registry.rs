use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;

use super::entities::{Cardapio, Curso, Disciplina, Local, Periodo, Professor};
use super::{Entity, Handle};

/// Insertion-ordered store of canonical instances for one entity kind.
pub struct Store<T: Entity> {
    index: HashMap<T::Key, usize>,
    items: Vec<Handle<T>>,
}

impl<T: Entity> Default for Store<T> {
    fn default() -> Self {
        Store {
            index: HashMap::new(),
            items: Vec::new(),
        }
    }
}

impl<T: Entity> Store<T> {
    /// Registry hit: merge the candidate into the canonical instance in place.
    /// Registry miss: the candidate becomes the canonical instance.
    fn get_or_create(&mut self, candidate: T) -> Handle<T> {
        let key = candidate.key();
        match self.index.get(&key) {
            Some(&i) => {
                let canonical = Rc::clone(&self.items[i]);
                canonical.borrow_mut().merge_from(candidate);
                canonical
            }
            None => {
                let handle = Rc::new(RefCell::new(candidate));
                self.index.insert(key, self.items.len());
                self.items.push(Rc::clone(&handle));
                handle
            }
        }
    }

    fn lookup(&self, key: &T::Key) -> Option<Handle<T>> {
        self.index.get(key).map(|&i| Rc::clone(&self.items[i]))
    }

    fn iter(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.items.iter().map(Rc::clone)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Process-wide store of canonical entities, one kind-scoped map per kind.
///
/// This is an explicit context object rather than a global: extraction
/// routines and tests all receive the registry they should populate, so tests
/// get an isolated registry per case instead of resetting shared state.
#[derive(Default)]
pub struct Registry {
    cursos: Store<Curso>,
    locais: Store<Local>,
    professores: Store<Professor>,
    disciplinas: Store<Disciplina>,
    periodos: Store<Periodo>,
    cardapios: Store<Cardapio>,
}

/// Ties an entity type to its kind-scoped store inside the registry. The
/// generic parameter is what makes `get_or_create`/`lookup` type-safe: there
/// is no way to file a `Disciplina` under the curso map.
pub trait Registered: Entity {
    fn store(reg: &Registry) -> &Store<Self>;
    fn store_mut(reg: &mut Registry) -> &mut Store<Self>;
}

macro_rules! registered {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(impl Registered for $ty {
            fn store(reg: &Registry) -> &Store<Self> {
                &reg.$field
            }
            fn store_mut(reg: &mut Registry) -> &mut Store<Self> {
                &mut reg.$field
            }
        })*
    };
}

registered! {
    Curso => cursos,
    Local => locais,
    Professor => professores,
    Disciplina => disciplinas,
    Periodo => periodos,
    Cardapio => cardapios,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Create-or-merge. Never registers two instances under the same key: a
    /// second sighting of a key mutates the first instance and returns it.
    pub fn get_or_create<T: Registered>(&mut self, candidate: T) -> Handle<T> {
        T::store_mut(self).get_or_create(candidate)
    }

    /// Pure read, no side effects.
    pub fn lookup<T: Registered>(&self, key: &T::Key) -> Option<Handle<T>> {
        T::store(self).lookup(key)
    }

    /// All canonical instances of a kind, in insertion order.
    pub fn values<T: Registered>(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        T::store(self).iter()
    }

    pub fn len<T: Registered>(&self) -> usize {
        T::store(self).len()
    }

    /// Explicit merge entry point for a fully-formed candidate discovered via
    /// a second listing. The stated key must agree with the candidate's own
    /// key; a disagreement is a contract violation, not a scrape failure.
    pub fn merge<T: Registered>(&mut self, key: &T::Key, other: T) -> Result<Handle<T>, Error> {
        let got = other.key();
        if *key != got {
            debug_assert!(false, "merge key mismatch: {:?} vs {:?}", key, got);
            return Err(Error::ShapeMismatch {
                kind: T::kind(),
                expected: key.to_string(),
                got: got.to_string(),
            });
        }
        Ok(T::store_mut(self).get_or_create(other))
    }
}
