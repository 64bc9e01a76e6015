/// Preview — interactive shell for trying out definition files.
///
/// Usage: preview <grammar> [--config <file.ron>] [--seed <n>] [--verbose]
///
/// Commands:
///   parse <text>        — rewrite arbitrary text
///   say <symbol>        — interpret a symbol
///   raw <symbol>        — show one template of a symbol, unexpanded
///   default             — interpret the `default` symbol
///   var <name>          — show a variable
///   vars                — list all variables
///   reset               — clear all variables
///   symbols             — list loaded symbols
///   bulk <symbol> <n>   — interpret n times with variety stats
///   seed <n>            — restart with a new seed
///   help                — list commands
///   quit                — exit

use clap::Parser;
use nimrod::{Grammar, GrammarConfig};
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(name = "preview")]
#[command(about = "Interactive shell for nimrod definition files")]
struct Cli {
    /// Root definition file (extension optional)
    grammar: PathBuf,

    /// Engine configuration (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RNG seed (overrides the configuration)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Log every rewrite pass to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => match GrammarConfig::load_from_ron(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        },
        None => GrammarConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let mut grammar = match build_grammar(&cli.grammar, config) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} symbols from {}", grammar.symbols().len(), cli.grammar.display());
    if let Some(seed) = grammar.config().seed {
        println!("Seed: {}", seed);
    }
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("nimrod> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
            None => (line.to_lowercase(), ""),
        };

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "parse" | "p" => {
                if rest.is_empty() {
                    println!("Usage: parse <text>");
                    continue;
                }
                report(grammar.parse(rest));
            }
            "say" | "s" => {
                if rest.is_empty() {
                    println!("Usage: say <symbol>");
                    continue;
                }
                report(grammar.interpret(rest));
            }
            "raw" => {
                if rest.is_empty() {
                    println!("Usage: raw <symbol>");
                    continue;
                }
                report(grammar.interpret_raw(rest));
            }
            "default" => report(grammar.interpret_default()),
            "var" => {
                if rest.is_empty() {
                    println!("Usage: var <name>");
                    continue;
                }
                println!("${} = \"{}\"", rest, grammar.var(rest));
            }
            "vars" => {
                let mut vars: Vec<(&str, &str)> = grammar.variables().iter().collect();
                if vars.is_empty() {
                    println!("No variables set.");
                }
                vars.sort_unstable();
                for (name, value) in vars {
                    println!("  ${} = \"{}\"", name, value);
                }
            }
            "reset" => {
                grammar.reset();
                println!("Variables cleared.");
            }
            "symbols" => {
                let mut symbols: Vec<(&str, &[String])> = grammar.symbols().iter().collect();
                symbols.sort_unstable_by_key(|(name, _)| *name);
                for (name, templates) in symbols {
                    println!("  {} ({} templates)", name, templates.len());
                }
            }
            "seed" => {
                let seed = match rest.parse::<u64>() {
                    Ok(s) => s,
                    Err(_) => {
                        println!("Usage: seed <n>");
                        continue;
                    }
                };
                let config = GrammarConfig {
                    seed: Some(seed),
                    ..grammar.config().clone()
                };
                match build_grammar(&cli.grammar, config) {
                    Ok(g) => {
                        grammar = g;
                        println!("Seed set to {}", seed);
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "bulk" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let count = parts.get(1).and_then(|n| n.parse::<usize>().ok());
                let (Some(symbol), Some(count)) = (parts.first(), count.filter(|&n| n > 0)) else {
                    println!("Usage: bulk <symbol> <n>");
                    continue;
                };
                bulk(&mut grammar, symbol, count);
            }
            _ => {
                println!("Unknown command: '{}'. Type 'help' for available commands.", cmd);
            }
        }
    }
}

fn build_grammar(path: &Path, config: GrammarConfig) -> Result<Grammar, nimrod::GrammarError> {
    let mut grammar = Grammar::with_config(config);
    grammar.load(path)?;
    Ok(grammar)
}

fn report(result: Result<String, nimrod::GrammarError>) {
    match result {
        Ok(text) => println!("{}", text),
        Err(e) => println!("ERROR: {}", e),
    }
}

fn bulk(grammar: &mut Grammar, symbol: &str, count: usize) {
    let mut outputs = Vec::with_capacity(count);
    let mut errors = 0;
    for _ in 0..count {
        match grammar.interpret(symbol) {
            Ok(text) => outputs.push(text),
            Err(_) => errors += 1,
        }
    }

    println!("\n=== Bulk: {} outputs ({} errors) ===\n", outputs.len(), errors);

    let unique: HashSet<&String> = outputs.iter().collect();
    println!("Unique outputs: {} / {}", unique.len(), outputs.len());

    let avg_len = if outputs.is_empty() {
        0.0
    } else {
        outputs.iter().map(|o| o.len() as f64).sum::<f64>() / outputs.len() as f64
    };
    println!("Average length: {:.0} chars", avg_len);

    let mut counts: HashMap<&String, usize> = HashMap::new();
    for output in &outputs {
        *counts.entry(output).or_insert(0) += 1;
    }
    let mut freq: Vec<(&String, usize)> = counts.into_iter().collect();
    freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    println!("\nMost frequent:");
    for (text, n) in freq.iter().take(5) {
        println!("  {:>5}  {}", n, text);
    }
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  parse <text>        Rewrite arbitrary text");
    println!("  say <symbol>        Interpret a symbol");
    println!("  raw <symbol>        Show one template, unexpanded");
    println!("  default             Interpret the 'default' symbol");
    println!("  var <name>          Show a variable");
    println!("  vars                List all variables");
    println!("  reset               Clear all variables");
    println!("  symbols             List loaded symbols");
    println!("  bulk <symbol> <n>   Interpret n times with variety statistics");
    println!("  seed <n>            Restart with a new seed");
    println!("  help                Show this help");
    println!("  quit                Exit");
    println!();
    println!("Directives: {{symbol}}  <p|text>  <p|A|B>  $name  $name=\"value\"  text $$name");
}
