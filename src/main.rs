mod error;
mod export;
mod model;
mod sig;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use model::{
    dump, ensure_all_resolved, ensure_resolved, load, Cardapio, Curso, Disciplina, Dump,
    Local as Sala, Periodo, Professor, Registry,
};
use sig::Sig;

#[derive(Parser)]
#[command(name = "sigscrape", about = "SIG university portal scraper")]
struct Cli {
    /// JSON state file, loaded before and saved after each command
    #[arg(short, long, global = true, default_value = "sig.json")]
    state: PathBuf,

    /// SIG credentials as "usuario:senha"
    #[arg(short, long, global = true)]
    login: Option<String>,

    /// File containing SIG credentials as "usuario:senha"
    #[arg(long, global = true, conflicts_with = "login")]
    login_file: Option<PathBuf>,

    /// Skip records that fail to extract instead of aborting the run
    #[arg(short, long, global = true)]
    keep_going: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all courses and their curricula
    Cursos,
    /// Scrape course offerings for one academic term (requires login)
    Ofertas {
        /// Term code (e.g. "2024/1"); defaults to the portal's latest
        #[arg(short, long)]
        periodo: Option<String>,
        /// Restrict the search to one subject code (e.g. GCC123)
        #[arg(short, long)]
        disciplina: Option<String>,
    },
    /// Scrape cafeteria menus starting today
    Cardapios {
        /// How many days ahead to fetch
        #[arg(short = 'n', long, default_value = "7")]
        days: u32,
    },
    /// Run a resolution pass and report every dangling reference
    Check,
    /// Project the entity graph into a SQL insert script
    ExportSql {
        /// Term whose offerings are exported
        #[arg(short, long)]
        periodo: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show entity counts in the current state
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut reg = Registry::new();
    load_state(&mut reg, &cli.state)?;

    match &cli.command {
        Commands::Cursos => cmd_cursos(&cli, &mut reg)?,
        Commands::Ofertas { periodo, disciplina } => {
            cmd_ofertas(&cli, &mut reg, periodo.as_deref(), disciplina.as_deref())?
        }
        Commands::Cardapios { days } => cmd_cardapios(&cli, &mut reg, *days)?,
        Commands::Check => {
            cmd_check(&reg);
            return Ok(());
        }
        Commands::ExportSql { periodo, output } => {
            cmd_export_sql(&reg, periodo, output.as_deref())?;
            return Ok(());
        }
        Commands::Stats => {
            cmd_stats(&reg);
            return Ok(());
        }
    }

    save_state(&reg, &cli.state)
}

// ── State ──

fn load_state(reg: &mut Registry, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading state file {}", path.display()))?;
    let d: Dump = serde_json::from_str(&raw)
        .with_context(|| format!("parsing state file {}", path.display()))?;
    load(reg, d);
    Ok(())
}

fn save_state(reg: &Registry, path: &Path) -> Result<()> {
    let d = dump(reg);
    let raw = serde_json::to_string_pretty(&d)?;
    fs::write(path, raw).with_context(|| format!("writing state file {}", path.display()))?;
    Ok(())
}

// ── Auth ──

fn credentials(cli: &Cli) -> Result<(String, String)> {
    let raw = match (&cli.login, &cli.login_file) {
        (Some(login), _) => login.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("reading login file {}", path.display()))?
            .trim()
            .to_string(),
        (None, None) => bail!("this command requires credentials (--login or --login-file)"),
    };
    match raw.split_once(':') {
        Some((user, pass)) => Ok((user.to_string(), pass.to_string())),
        None => bail!("credentials must be in the form usuario:senha"),
    }
}

fn logged_in_session(cli: &Cli) -> Result<Sig> {
    let (user, pass) = credentials(cli)?;
    let mut sig = Sig::new()?;
    sig.login(&user, &pass)?;
    Ok(sig)
}

// ── Commands ──

fn progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Batch policy shared by all scraping loops: with --keep-going a failed
/// record is logged and skipped, otherwise it aborts the run.
fn handle_failure(cli: &Cli, what: &str, err: error::Error) -> Result<()> {
    if cli.keep_going {
        warn!("skipping {what}: {err}");
        Ok(())
    } else {
        Err(err).with_context(|| format!("extracting {what}"))
    }
}

fn cmd_cursos(cli: &Cli, reg: &mut Registry) -> Result<()> {
    let mut sig = Sig::new()?;
    let cursos = sig.get_cursos(reg)?;
    println!("Found {} courses", cursos.len());

    let pb = progress(cursos.len() as u64);
    let mut total = 0usize;
    for curso in &cursos {
        let cod = curso.borrow().cod.clone();
        pb.set_message(cod.clone());
        match sig.get_matrizes(reg, curso) {
            Ok(n) => total += n,
            Err(e) => handle_failure(cli, &format!("curricula of {cod}"), e)?,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!("Scraped {} curricula across {} courses", total, cursos.len());

    // Requirement lists may name subjects no curriculum carries; those stay
    // raw until the offerings for them are scraped.
    let report = ensure_resolved(reg, &cursos);
    if !report.is_clean() {
        println!(
            "{} references not yet resolvable (run 'check' for details)",
            report.unresolved.len()
        );
    }
    Ok(())
}

fn cmd_ofertas(
    cli: &Cli,
    reg: &mut Registry,
    periodo: Option<&str>,
    disciplina: Option<&str>,
) -> Result<()> {
    let mut sig = logged_in_session(cli)?;
    let periodos = sig.get_periodos(reg)?;
    let periodo = match periodo {
        Some(cod) => periodos
            .iter()
            .find(|p| p.borrow().cod == cod)
            .cloned()
            .with_context(|| format!("term '{cod}' not offered by the portal"))?,
        None => periodos
            .last()
            .cloned()
            .context("the portal lists no academic terms")?,
    };
    let periodo_cod = periodo.borrow().cod.clone();

    let heads = sig.get_ofertas(reg, &periodo, disciplina)?;
    println!("Found {} offerings in {}", heads.len(), periodo_cod);

    let pb = progress(heads.len() as u64);
    let mut ok = 0usize;
    for head in &heads {
        pb.set_message(format!("{} {}", head.disc, head.turma));
        match sig.get_oferta(reg, head, &periodo_cod) {
            Ok(_) => ok += 1,
            Err(e) => handle_failure(cli, &format!("{} turma {}", head.disc, head.turma), e)?,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!("Scraped {ok} of {} offerings", heads.len());

    sig.logout()?;
    Ok(())
}

fn cmd_cardapios(cli: &Cli, reg: &mut Registry, days: u32) -> Result<()> {
    let mut sig = Sig::new()?;
    let today = Local::now().date_naive();

    let pb = progress(days as u64);
    for offset in 0..days {
        let data = today + Duration::days(offset as i64);
        pb.set_message(data.to_string());
        if let Err(e) = sig.get_cardapio(reg, data) {
            handle_failure(cli, &format!("menu for {data}"), e)?;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!("Scraped menus for {days} days");
    Ok(())
}

fn cmd_check(reg: &Registry) {
    let report = ensure_all_resolved(reg);
    if report.is_clean() {
        println!("All references resolve.");
        return;
    }
    println!("{} dangling references:", report.unresolved.len());
    for d in &report.unresolved {
        println!("  {d}");
    }
}

fn cmd_export_sql(reg: &Registry, periodo: &str, output: Option<&Path>) -> Result<()> {
    // The projection assumes a fully linked graph; refuse to export one that
    // still has dangling keys.
    let report = ensure_all_resolved(reg);
    if !report.is_clean() {
        for d in &report.unresolved {
            warn!("dangling: {d}");
        }
        bail!(
            "{} dangling references; scrape the missing entities first (see 'check')",
            report.unresolved.len()
        );
    }

    let script = export::sql::build(reg, periodo)?;
    match output {
        Some(path) => {
            fs::write(path, &script)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {} bytes to {}", script.len(), path.display());
        }
        None => print!("{script}"),
    }
    Ok(())
}

fn cmd_stats(reg: &Registry) {
    println!("Cursos:       {}", reg.len::<Curso>());
    println!("Disciplinas:  {}", reg.len::<Disciplina>());
    println!("Professores:  {}", reg.len::<Professor>());
    println!("Locais:       {}", reg.len::<Sala>());
    println!("Periodos:     {}", reg.len::<Periodo>());
    println!("Cardapios:    {}", reg.len::<Cardapio>());
}
