//! cintool: compile, import, inspect and try out CIN tables.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use libcin_core::{
    load_cin_file, CinEngine, CompositionEvent, Config, FstTable, RedbTable, TableStore,
};

#[derive(Parser)]
#[command(name = "cintool", about = "CIN table input method tools")]
struct Args {
    /// Per-install overrides (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a CIN file into an fst + bincode table directory
    Compile {
        input: PathBuf,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Import a CIN file into a redb database, replacing its contents
    Import {
        input: PathBuf,
        #[arg(long)]
        db: PathBuf,
    },
    /// Print a summary of a CIN file
    Dump {
        input: PathBuf,
        /// Print the whole parsed table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Feed keys through the engine and print every event
    Type {
        /// CIN file, compiled table directory, or .redb database
        #[arg(long)]
        table: PathBuf,
        /// Keys to type; U+0008 (backspace) deletes
        keys: String,
    },
    /// Type line by line; `:bs`, `:next`, `:prev`, `:reset`, `:quit`
    Repl {
        #[arg(long)]
        table: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_toml(path)
            .map_err(|e| anyhow!("loading config {}: {}", path.display(), e))?,
        None => Config::default(),
    };

    match args.command {
        Command::Compile { input, out } => {
            let table = FstTable::from_cin_file(&input)
                .with_context(|| format!("compiling {}", input.display()))?;
            table
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(input = %input.display(), out = %out.display(), "compiled table");
            println!(
                "Wrote {} quick and {} chardef keycodes to {}",
                table.quick_len(),
                table.chardef_len(),
                out.display()
            );
        }
        Command::Import { input, db } => {
            let table =
                load_cin_file(&input).with_context(|| format!("reading {}", input.display()))?;
            let mut store = RedbTable::open(&db, config.lookup_cache_size)
                .with_context(|| format!("opening {}", db.display()))?;
            store
                .import(&table)
                .with_context(|| format!("importing into {}", db.display()))?;
            info!(input = %input.display(), db = %db.display(), "imported table");
            println!(
                "Imported {} ({} chardef records) into {}",
                table.settings.ename,
                table.chardef.len(),
                db.display()
            );
        }
        Command::Dump { input, json } => {
            let table =
                load_cin_file(&input).with_context(|| format!("reading {}", input.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                let s = &table.settings;
                println!("ename:        {}", s.ename);
                println!("cname:        {}", s.cname);
                println!("prompt:       {}", s.prompt);
                println!("selkey:       {}", s.selection_keys);
                println!("dupsel:       {}", s.duplicate_selection_count);
                println!("endkey:       {}", s.end_keys);
                println!("space_style:  {}", s.space_style.code());
                println!("max keycode:  {}", s.max_key_length);
                println!("keynames:     {}", table.keynames.len());
                println!("quick:        {}", table.quick.len());
                println!(
                    "chardef:      {} records, {} keycodes",
                    table.chardef.len(),
                    table.chardef_keycodes()
                );
            }
        }
        Command::Type { table, keys } => {
            let mut engine = CinEngine::with_config(open_store(&table, &config)?, config);
            for key in keys.chars() {
                if key == '\u{8}' {
                    engine.delete_backward()?;
                } else {
                    engine.process_key(key)?;
                }
                print_events(&mut engine);
            }
            println!("committed: {}", engine.context_mut().take_commit());
        }
        Command::Repl { table } => {
            let mut engine = CinEngine::with_config(open_store(&table, &config)?, config);
            repl(&mut engine)?;
        }
    }
    Ok(())
}

/// Open a table from a CIN file, a compiled directory or a redb database.
fn open_store(path: &Path, config: &Config) -> Result<Arc<dyn TableStore>> {
    if path.is_dir() {
        let table =
            FstTable::load(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok(Arc::new(table));
    }
    if path.extension().and_then(|e| e.to_str()) == Some("redb") {
        let store = RedbTable::open(path, config.lookup_cache_size)
            .with_context(|| format!("opening {}", path.display()))?;
        if !store.is_loaded() {
            eprintln!("{} has no imported table; keys pass through", path.display());
        }
        return Ok(Arc::new(store));
    }
    let table =
        FstTable::from_cin_file(path).with_context(|| format!("compiling {}", path.display()))?;
    Ok(Arc::new(table))
}

fn print_events(engine: &mut CinEngine) {
    for event in engine.context_mut().take_events() {
        match event {
            CompositionEvent::Keynames(k) => println!("  keys       {}", k),
            CompositionEvent::Candidates(c) => println!("  candidates {}", c.join(" ")),
            CompositionEvent::CurrentCandidates(c) => println!("  page       {}", c.join(" ")),
            CompositionEvent::EndKey(c) => println!("  select     {}", c.join(" ")),
            CompositionEvent::Commit(t) => println!("  commit     {}", t),
        }
    }
}

fn repl(engine: &mut CinEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{}> ", engine.keynames());
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            ":quit" | ":q" => break,
            ":bs" => {
                engine.delete_backward()?;
            }
            ":next" => {
                engine.next_page();
            }
            ":prev" => {
                engine.previous_page();
            }
            ":reset" => engine.reset(),
            _ => {
                for key in line.chars() {
                    if let Err(err) = engine.process_key(key) {
                        eprintln!("lookup failed: {}", err);
                    }
                }
            }
        }
        print_events(engine);
        let page = engine.current_page_candidates();
        if !page.is_empty() {
            let list = engine.candidates();
            println!(
                "  [{}/{}] {}",
                list.current_page(),
                list.num_pages(),
                page.iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }
        let committed = engine.context_mut().take_commit();
        if !committed.is_empty() {
            println!("{}", committed);
        }
    }
    Ok(())
}
