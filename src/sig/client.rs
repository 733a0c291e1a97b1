use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::Method;
use tracing::{debug, info};

use crate::error::Error;
use crate::model::{Cardapio, Curso, Disciplina, Handle, Periodo, Registry};

use super::extract::{self, ofertas::OfertaHead};
use super::html::parse_html;

const SIG_BASE_URL: &str = "https://sig.ufla.br";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/111.0";

/// The portal endpoints the scraper talks to. Each module is a fixed path
/// under the portal base URL; most require an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Index,
    Login,
    Logout,
    Rematricula,
    ConsultarHorario,
    Matrizes,
    Cardapio,
}

impl Module {
    pub fn path(self) -> &'static str {
        match self {
            Module::Index => "/",
            Module::Login => "/modulos/login/index.php",
            Module::Logout => "/modulos/login/sair.php",
            Module::Rematricula => "/modulos/alunos/rematricula/index.php",
            Module::ConsultarHorario => {
                "/modulos/alunos/rematricula/consultar_horario_disciplina.php"
            }
            Module::Matrizes => "/modulos/publico/matrizes_curriculares/index.php",
            Module::Cardapio => "/modulos/publico/cardapio/index.php",
        }
    }

    pub fn requires_auth(self) -> bool {
        !matches!(self, Module::Login | Module::Matrizes | Module::Cardapio)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Module::Index => "index",
            Module::Login => "login",
            Module::Logout => "logout",
            Module::Rematricula => "rematricula",
            Module::ConsultarHorario => "consultar_horario",
            Module::Matrizes => "matrizes",
            Module::Cardapio => "cardapio",
        };
        f.write_str(name)
    }
}

type Params<'a> = &'a [(&'a str, String)];

/// Blocking session against the SIG portal. One cookie jar for the whole
/// session; no retries, a failed request propagates as-is.
pub struct Sig {
    client: Client,
    base_url: String,
    logged_in: bool,
    /// Token the consult form echoes back, required on every search POST.
    last_csrf: Option<String>,
}

impl Sig {
    pub fn new() -> Result<Self, Error> {
        Self::with_base_url(SIG_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|source| Error::Transport {
                module: "index".into(),
                source,
            })?;
        Ok(Sig {
            client,
            base_url: base_url.into(),
            logged_in: false,
            last_csrf: None,
        })
    }

    fn request(
        &self,
        method: Method,
        module: Module,
        form: Option<Params<'_>>,
        query: Option<Params<'_>>,
    ) -> Result<String, Error> {
        if module.requires_auth() && !self.logged_in {
            return Err(Error::AuthRequired(module.to_string()));
        }
        let url = format!("{}{}", self.base_url, module.path());
        let mut req = self.client.request(method.clone(), &url);
        if let Some(query) = query {
            req = req.query(query);
        }
        if let Some(form) = form {
            req = req.form(form);
        }

        let resp = req.send().map_err(|source| Error::Transport {
            module: module.to_string(),
            source,
        })?;
        debug!(%module, %method, status = %resp.status(), "sig request");
        if !resp.status().is_success() {
            return Err(Error::ExternalRequestFailure {
                module: module.to_string(),
                status: resp.status().as_u16(),
            });
        }
        resp.text().map_err(|source| Error::Transport {
            module: module.to_string(),
            source,
        })
    }

    // ── Session ──

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), Error> {
        if self.logged_in {
            return Ok(());
        }
        info!(username, "logging into SIG");
        self.request(Method::GET, Module::Index, None, None)?;
        self.request(
            Method::POST,
            Module::Login,
            Some(&[
                ("login", username.to_string()),
                ("senha", password.to_string()),
                ("lembrar_login", "0".to_string()),
                ("entrar", "Entrar".to_string()),
            ]),
            None,
        )?;
        self.logged_in = true;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), Error> {
        if !self.logged_in {
            return Ok(());
        }
        self.request(Method::GET, Module::Logout, None, None)?;
        self.logged_in = false;
        Ok(())
    }

    // ── Public pages ──

    /// List all course programs from the public curricula page.
    pub fn get_cursos(&mut self, reg: &mut Registry) -> Result<Vec<Handle<Curso>>, Error> {
        info!("listing courses");
        let page = self.request(Method::GET, Module::Matrizes, None, None)?;
        extract::cursos::extract(reg, &parse_html(&page))
    }

    /// Scrape every curriculum of one course, opening and closing each detail
    /// row. Returns how many curricula were folded into the course.
    pub fn get_matrizes(&mut self, reg: &mut Registry, curso: &Handle<Curso>) -> Result<usize, Error> {
        let (cod, sig_cod_int) = {
            let c = curso.borrow();
            (c.cod.clone(), c.sig_cod_int)
        };
        info!(curso = %cod, "listing curricula");
        let listing = self.request(
            Method::POST,
            Module::Matrizes,
            Some(&[
                ("cod_oferta_curso", sig_cod_int.to_string()),
                ("enviar", "Consultar".to_string()),
            ]),
            Some(&[("xml", "1".to_string())]),
        )?;
        let cod_mats = extract::matriz::list_matrizes(&parse_html(&listing))?;
        debug!(curso = %cod, ?cod_mats, "curricula found");

        let mut matrizes = Vec::new();
        for cod_mat in cod_mats {
            let page = self.request(
                Method::GET,
                Module::Matrizes,
                None,
                Some(&[
                    ("cod_matriz_curricular", cod_mat.to_string()),
                    ("op", "abrir".to_string()),
                ]),
            )?;
            let matriz = extract::matriz::extract(reg, &parse_html(&page), cod_mat)?;
            // Companion close; the server keeps per-session open/closed state.
            self.request(
                Method::GET,
                Module::Matrizes,
                None,
                Some(&[
                    ("cod_matriz_curricular", cod_mat.to_string()),
                    ("op", "fechar".to_string()),
                ]),
            )?;
            matrizes.push(matriz);
        }

        let n = matrizes.len();
        reg.merge(
            &cod,
            Curso {
                cod: cod.clone(),
                matrizes,
                ..Default::default()
            },
        )?;
        Ok(n)
    }

    /// One day's cafeteria menu.
    pub fn get_cardapio(&mut self, reg: &mut Registry, data: NaiveDate) -> Result<Handle<Cardapio>, Error> {
        let page = self.request(
            Method::GET,
            Module::Cardapio,
            None,
            Some(&[("data", data.format("%d/%m/%Y").to_string())]),
        )?;
        extract::cardapio::extract(reg, &parse_html(&page))
    }

    // ── Authenticated consult pages ──

    /// Prime the consult form: visit the enrollment page, grab the CSRF token
    /// and the list of academic terms. Requires login.
    pub fn get_periodos(&mut self, reg: &mut Registry) -> Result<Vec<Handle<Periodo>>, Error> {
        self.request(Method::GET, Module::Rematricula, None, None)?;
        let page = self.request(Method::GET, Module::ConsultarHorario, None, None)?;
        let root = parse_html(&page);
        self.last_csrf = extract::ofertas::csrf_token(&root);
        extract::periodos::extract(reg, &root)
    }

    fn csrf(&mut self, reg: &mut Registry) -> Result<String, Error> {
        if self.last_csrf.is_none() {
            self.get_periodos(reg)?;
        }
        self.last_csrf
            .clone()
            .ok_or_else(|| Error::malformed("consulta", "token_csrf", "hidden token not found"))
    }

    /// Run an offering search for one term, optionally narrowed to a subject
    /// code. Returns the listing heads; each is opened individually with
    /// [`Sig::get_oferta`].
    pub fn get_ofertas(
        &mut self,
        reg: &mut Registry,
        periodo: &Handle<Periodo>,
        disciplina: Option<&str>,
    ) -> Result<Vec<OfertaHead>, Error> {
        let token = self.csrf(reg)?;
        let (periodo_cod, periodo_int) = {
            let p = periodo.borrow();
            (p.cod.clone(), p.sig_cod_int)
        };
        info!(periodo = %periodo_cod, ?disciplina, "searching offerings");
        let page = self.request(
            Method::POST,
            Module::ConsultarHorario,
            Some(&[
                ("pesquisar_matriz", "0".to_string()),
                ("modulo", "T".to_string()),
                ("codigo", disciplina.unwrap_or_default().to_string()),
                ("nome_disciplina", String::new()),
                ("bimestre", "T".to_string()),
                ("cod_periodo_letivo", periodo_int.to_string()),
                ("token_csrf", token),
                ("enviar", "Consultar".to_string()),
            ]),
            None,
        )?;
        let root = parse_html(&page);
        // The form rotates its token on every search.
        if let Some(token) = extract::ofertas::csrf_token(&root) {
            self.last_csrf = Some(token);
        }
        extract::ofertas::heads(&root)
    }

    /// Open one offering's detail row, fold it into its subject for the given
    /// term, and close the row again.
    pub fn get_oferta(
        &mut self,
        reg: &mut Registry,
        head: &OfertaHead,
        periodo: &str,
    ) -> Result<Handle<Disciplina>, Error> {
        debug!(disc = %head.disc, turma = %head.turma, "opening offering");
        let page = self.request(
            Method::GET,
            Module::ConsultarHorario,
            None,
            Some(&[
                ("cod_oferta_disciplina", head.cod.to_string()),
                ("op", "abrir".to_string()),
            ]),
        )?;
        let oferta = extract::ofertas::extract(reg, &parse_html(&page), head, periodo)?;
        self.request(
            Method::GET,
            Module::ConsultarHorario,
            None,
            Some(&[
                ("cod_oferta_disciplina", head.cod.to_string()),
                ("op", "fechar".to_string()),
            ]),
        )?;

        let mut ofertas = BTreeMap::new();
        ofertas.insert(periodo.to_string(), vec![oferta]);
        reg.merge(
            &head.disc,
            Disciplina {
                cod: head.disc.clone(),
                nome: head.nome.clone(),
                creditos: 0,
                ofertas,
            },
        )
    }
}
