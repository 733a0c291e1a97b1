pub mod dump;
pub mod entities;
pub mod reference;
pub mod registry;
pub mod resolve;

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

pub use dump::{dump, load, Dump};
pub use entities::{
    Cardapio, Curso, Disciplina, DisciplinaMatriz, Horario, HorarioLocal, Local,
    MatrizCurricular, Oferta, Periodo, Professor, Vagas,
};
pub use reference::Ref;
pub use registry::{Registered, Registry};
pub use resolve::{ensure_all_resolved, ensure_resolved, ResolutionReport, ResolveRefs};

/// Canonical entities are shared between the registry and every reference cell
/// bound to them; the whole graph is single-threaded.
pub type Handle<T> = Rc<RefCell<T>>;

/// The six entity kinds the registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Curso,
    Disciplina,
    Local,
    Professor,
    Periodo,
    Cardapio,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Curso => "Curso",
            Kind::Disciplina => "Disciplina",
            Kind::Local => "Local",
            Kind::Professor => "Professor",
            Kind::Periodo => "Periodo",
            Kind::Cardapio => "Cardapio",
        };
        f.write_str(s)
    }
}

/// A record with a natural key. The key is immutable and derived from the
/// entity's own fields; `merge_from` folds a later partial sighting into the
/// canonical instance (fill-only, see each impl in `entities`).
pub trait Entity: Sized + 'static {
    type Key: Clone + Eq + Ord + Hash + fmt::Display + fmt::Debug;

    fn kind() -> Kind;
    fn key(&self) -> Self::Key;
    fn merge_from(&mut self, other: Self);
}
