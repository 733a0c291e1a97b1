use serde::{Deserialize, Serialize};

use super::entities::{Cardapio, Curso, Disciplina, Local, Periodo, Professor};
use super::registry::{Registered, Registry};

/// Persisted form of the whole registry: one insertion-ordered list per entity
/// kind, each element the flat serialization of one canonical entity with all
/// reference cells rendered as raw keys (dates as ISO-8601).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Dump {
    #[serde(default)]
    pub cursos: Vec<Curso>,
    #[serde(default)]
    pub locais: Vec<Local>,
    #[serde(default)]
    pub professores: Vec<Professor>,
    #[serde(default)]
    pub disciplinas: Vec<Disciplina>,
    #[serde(default)]
    pub periodos: Vec<Periodo>,
    #[serde(default)]
    pub cardapios: Vec<Cardapio>,
}

fn collect<T: Registered + Clone>(reg: &Registry) -> Vec<T> {
    reg.values::<T>().map(|h| h.borrow().clone()).collect()
}

pub fn dump(reg: &Registry) -> Dump {
    Dump {
        cursos: collect(reg),
        locais: collect(reg),
        professores: collect(reg),
        disciplinas: collect(reg),
        periodos: collect(reg),
        cardapios: collect(reg),
    }
}

/// Replay `get_or_create` per element, in a fixed kind order so later kinds'
/// reference cells can resolve against earlier kinds. Unresolved cells are
/// tolerated; resolution stays lazy. Merging applies against pre-loaded
/// entities, so re-running a scrape on top of a loaded dump is idempotent.
pub fn load(reg: &mut Registry, d: Dump) {
    for e in d.cursos {
        reg.get_or_create(e);
    }
    for e in d.locais {
        reg.get_or_create(e);
    }
    for e in d.professores {
        reg.get_or_create(e);
    }
    for e in d.disciplinas {
        reg.get_or_create(e);
    }
    for e in d.periodos {
        reg.get_or_create(e);
    }
    for e in d.cardapios {
        reg.get_or_create(e);
    }
}
